use serde::{Deserialize, Serialize};

use crate::{
    domain::{Generation, RoomLocalId, ServiceId},
    error::NoResultsReason,
};

/// Position of a node in the room tree of one generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeHandle {
    Service { service: usize },
    Room { service: usize, room: usize },
}

/// Opaque reference to a listed room, valid only within the generation it was issued in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomToken {
    pub generation: Generation,
    pub service: usize,
    pub room: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ViewEvent {
    DiscoveryStarted {
        generation: Generation,
    },
    ServiceAppended {
        service_id: ServiceId,
        name: String,
    },
    RoomAppended {
        parent_id: ServiceId,
        local_id: RoomLocalId,
        name: String,
        token: RoomToken,
    },
    RoomPatched {
        token: RoomToken,
        description: String,
        occupant_count: u32,
    },
    RevealResults,
    NoResults {
        reason: NoResultsReason,
    },
    ReportError {
        message: String,
    },
    NoAccounts,
}
