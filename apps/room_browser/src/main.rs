mod catalog;
mod config;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{
    Account, ChannelPresenter, DiscoveryConfig, RequestCoordinator, ServiceNode, SessionOutcome,
    ViewModelSink,
};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::{
    catalog::{Catalog, CatalogAccount},
    config::{load_settings, Settings},
};

#[derive(Parser, Debug)]
#[command(about = "Browse the public chat rooms reachable from your accounts")]
struct Args {
    #[arg(long, default_value = "room_browser.toml")]
    config: PathBuf,
    /// Account address to browse with; repeat for several accounts.
    #[arg(long = "account")]
    accounts: Vec<String>,
    #[arg(long)]
    catalog: Option<PathBuf>,
    #[arg(long)]
    custom_service: Option<String>,
    /// Trigger a manual refresh this many milliseconds after the first listing finished.
    #[arg(long)]
    refresh_after_ms: Option<u64>,
}

impl Args {
    fn apply(self, settings: &mut Settings) {
        if !self.accounts.is_empty() {
            settings.accounts = self.accounts;
        }
        if let Some(v) = self.catalog {
            settings.catalog_path = v;
        }
        if let Some(v) = self.custom_service {
            settings.custom_service = Some(v);
        }
        if let Some(v) = self.refresh_after_ms {
            settings.refresh_after_ms = Some(v);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = load_settings(&args.config)?;
    args.apply(&mut settings);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_filter))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let catalog = Arc::new(Catalog::load(&settings.catalog_path)?);
    let accounts: Vec<Arc<dyn Account>> = settings
        .accounts
        .iter()
        .map(|address| {
            CatalogAccount::new(address.as_str(), Arc::clone(&catalog)) as Arc<dyn Account>
        })
        .collect();
    info!(
        accounts = accounts.len(),
        catalog = %settings.catalog_path.display(),
        "opening public room browser"
    );

    let (presenter, mut events) = ChannelPresenter::new();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(err) => warn!("failed to encode view event: {err}"),
            }
        }
    });

    let sink = ViewModelSink::new(presenter);
    let coordinator = RequestCoordinator::new(
        Arc::clone(&sink),
        DiscoveryConfig {
            channel_capacity: settings.channel_capacity,
        },
    );
    if let Some(service) = &settings.custom_service {
        coordinator.set_custom_service(service.as_str()).await;
    }

    if let Some(running) = coordinator.open(accounts).await {
        report(running.await.context("discovery task panicked")?);
    }

    if let Some(delay) = settings.refresh_after_ms {
        tokio::time::sleep(Duration::from_millis(delay)).await;
        match coordinator.refresh().await {
            Ok(running) => report(running.await.context("discovery task panicked")?),
            Err(err) => warn!("refresh skipped: {err}"),
        }
    }

    tokio::time::sleep(Duration::from_millis(settings.linger_ms)).await;
    let snapshot = sink.snapshot().await;
    coordinator.close();
    drop(coordinator);
    drop(sink);
    if tokio::time::timeout(Duration::from_millis(settings.linger_ms), printer)
        .await
        .is_err()
    {
        warn!("view event printer did not drain before shutdown");
    }

    println!(
        "{}",
        json!({ "type": "snapshot", "payload": snapshot_json(&snapshot) })
    );
    Ok(())
}

fn report(outcome: SessionOutcome) {
    match outcome {
        SessionOutcome::Finished {
            generation,
            outcome,
        } => info!(%generation, ?outcome, "room listing finished"),
        SessionOutcome::Superseded => info!("room listing superseded by a newer request"),
    }
}

fn snapshot_json(services: &[ServiceNode]) -> serde_json::Value {
    services
        .iter()
        .map(|service| {
            json!({
                "service_id": service.record.service_id,
                "name": service.record.display_name,
                "rooms": service.rooms.iter().map(|room| json!({
                    "local_id": room.record.local_id,
                    "name": room.record.display_name,
                    "description": room.record.description,
                    "occupants": room.record.occupant_count,
                })).collect::<Vec<_>>(),
            })
        })
        .collect()
}
