use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id_newtype!(AccountId);
string_id_newtype!(ServiceId);
string_id_newtype!(RoomLocalId);

/// Version of the "current query" of one room browser view.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Returns the domain part of an account address such as `alice@example.org/laptop`.
pub fn host_of_address(address: &str) -> &str {
    let bare = address.split('/').next().unwrap_or_default();
    match bare.rsplit_once('@') {
        Some((_, host)) => host,
        None => bare,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryRequest {
    pub service_host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_service: Option<String>,
}

impl DiscoveryRequest {
    pub fn new(service_host: impl Into<String>, custom_service: Option<String>) -> Self {
        let custom_service = custom_service
            .map(|service| service.trim().to_string())
            .filter(|service| !service.is_empty());
        Self {
            service_host: service_host.into(),
            custom_service,
        }
    }

    pub fn has_custom_service(&self) -> bool {
        self.custom_service.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub service_id: ServiceId,
    pub display_name: String,
}

impl ServiceRecord {
    pub fn new(service_id: impl Into<ServiceId>, display_name: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            display_name: display_name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRecord {
    pub local_id: RoomLocalId,
    pub service_id: ServiceId,
    /// Display name of the hosting service, used when the room arrives before its service.
    #[serde(default)]
    pub service_name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub occupant_count: u32,
}

impl RoomRecord {
    pub fn service_record(&self) -> ServiceRecord {
        ServiceRecord {
            service_id: self.service_id.clone(),
            display_name: self.service_name.clone(),
        }
    }
}

/// Mutable part of a room listing, refreshed after the room was first listed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoomDetails {
    pub description: String,
    pub occupant_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Affiliation {
    Owner,
    Admin,
    Member,
    Outcast,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccupantRole {
    Moderator,
    Participant,
    Visitor,
    None,
}
