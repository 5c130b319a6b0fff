use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported on the error stream of a discovery session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    #[error("room discovery transport failure: {0}")]
    Transport(String),
    #[error("chat service {0} did not answer the discovery query")]
    ServiceNotFound(String),
    #[error("account session is closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoResultsReason {
    EmptyCustomService,
    NoServices,
}

impl NoResultsReason {
    pub fn message(self) -> &'static str {
        match self {
            Self::EmptyCustomService => "That service doesn't seem to exist",
            Self::NoServices => "Your server doesn't seem to have any chat room services",
        }
    }
}
