//! A room directory read from a TOML catalog, standing in for a live chat server.

use std::{fs, path::Path, sync::Arc, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use client_core::{Account, DiscoverySender, RoomListing};
use serde::Deserialize;
use shared::{
    domain::{host_of_address, AccountId, DiscoveryRequest, RoomRecord, ServiceRecord},
    error::DiscoveryError,
};
use tracing::debug;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub hosts: Vec<HostEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostEntry {
    pub host: String,
    /// Simulated transport failure for every query against this host.
    #[serde(default)]
    pub fail: Option<String>,
    /// Pause between two delivered records.
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default)]
    pub services: Vec<ServiceEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub rooms: Vec<RoomEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomEntry {
    pub local: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub occupants: u32,
    #[serde(default)]
    pub refresh: Option<RoomRefresh>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomRefresh {
    pub after_ms: u64,
    pub description: String,
    pub occupants: u32,
}

impl Catalog {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read room catalog '{}'", path.display()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("invalid room catalog '{}'", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    fn host(&self, host: &str) -> Option<&HostEntry> {
        self.hosts.iter().find(|entry| entry.host == host)
    }

    /// What a query for `request` returns: the failure to report, or the services to list.
    fn resolve(
        &self,
        request: &DiscoveryRequest,
    ) -> Result<(u64, Vec<ServiceEntry>), DiscoveryError> {
        let host = self.host(&request.service_host);
        if let Some(message) = host.and_then(|entry| entry.fail.clone()) {
            return Err(DiscoveryError::Transport(message));
        }
        let delay_ms = host.map(|entry| entry.delay_ms).unwrap_or_default();

        let services = match &request.custom_service {
            Some(custom) => self
                .hosts
                .iter()
                .flat_map(|entry| entry.services.iter())
                .filter(|service| &service.id == custom)
                .take(1)
                .cloned()
                .collect(),
            None => host.map(|entry| entry.services.clone()).unwrap_or_default(),
        };
        Ok((delay_ms, services))
    }
}

/// An account whose server answers room queries from a [`Catalog`].
pub struct CatalogAccount {
    address: String,
    catalog: Arc<Catalog>,
}

impl CatalogAccount {
    pub fn new(address: impl Into<String>, catalog: Arc<Catalog>) -> Arc<Self> {
        Arc::new(Self {
            address: address.into(),
            catalog,
        })
    }
}

#[async_trait]
impl Account for CatalogAccount {
    fn id(&self) -> AccountId {
        let bare = self.address.split('/').next().unwrap_or_default();
        AccountId::from(bare)
    }

    fn address(&self) -> String {
        self.address.clone()
    }

    async fn get_rooms(&self, request: &DiscoveryRequest, results: DiscoverySender) {
        let resolved = self.catalog.resolve(request);
        let account = self.id();
        debug!(
            %account,
            host = host_of_address(&self.address),
            "answering room query from catalog"
        );
        tokio::spawn(async move {
            let (delay_ms, services) = match resolved {
                Ok(resolved) => resolved,
                Err(error) => {
                    results.fail(error).await;
                    return;
                }
            };
            let delay = Duration::from_millis(delay_ms);
            for service in services {
                tokio::time::sleep(delay).await;
                if results
                    .service(ServiceRecord::new(service.id.as_str(), service.name.as_str()))
                    .await
                    .is_err()
                {
                    return;
                }
                for room in service.rooms {
                    tokio::time::sleep(delay).await;
                    if publish_room(&results, &service.id, &service.name, room)
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
            }
        });
    }
}

async fn publish_room(
    results: &DiscoverySender,
    service_id: &str,
    service_name: &str,
    room: RoomEntry,
) -> Result<(), DiscoveryError> {
    let record = RoomRecord {
        local_id: room.local.into(),
        service_id: service_id.into(),
        service_name: service_name.to_string(),
        display_name: room.name,
        description: room.description,
        occupant_count: room.occupants,
    };
    let Some(refresh) = room.refresh else {
        return results.room(RoomListing::new(record)).await;
    };
    let (listing, updater) = RoomListing::with_updates(record);
    results.room(listing).await?;
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(refresh.after_ms)).await;
        updater.update(refresh.description, refresh.occupants);
    });
    Ok(())
}
