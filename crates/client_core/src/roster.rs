//! Occupant rosters of joined rooms, maintained from MUC presence events.

use std::collections::{BTreeMap, HashMap};

use shared::domain::{Affiliation, OccupantRole};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MucEventInfo {
    OccupantJoined {
        real_address: Option<String>,
        affiliation: Affiliation,
        role: OccupantRole,
        status: String,
    },
    OccupantUpdated {
        affiliation: Affiliation,
        role: OccupantRole,
    },
    OccupantLeft {
        affiliation: Affiliation,
        role: OccupantRole,
    },
    Error {
        condition: String,
    },
    Unsupported(String),
}

/// A MUC event as delivered by the account session; `from` is the occupant address
/// `room@service/nickname`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MucEvent {
    pub from: String,
    pub info: MucEventInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occupant {
    pub nickname: String,
    pub real_address: Option<String>,
    pub affiliation: Affiliation,
    pub role: OccupantRole,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterChange {
    Joined { room: String, nickname: String },
    Updated { room: String, nickname: String },
    Left { room: String, nickname: String },
    RoomError { room: String, condition: String },
    Ignored,
}

pub fn split_occupant_address(address: &str) -> (&str, Option<&str>) {
    match address.split_once('/') {
        Some((room, nickname)) if !nickname.is_empty() => (room, Some(nickname)),
        Some((room, _)) => (room, None),
        None => (address, None),
    }
}

#[derive(Debug, Default)]
pub struct RoomRoster {
    occupants: BTreeMap<String, Occupant>,
}

impl RoomRoster {
    pub fn get(&self, nickname: &str) -> Option<&Occupant> {
        self.occupants.get(nickname)
    }

    pub fn len(&self) -> usize {
        self.occupants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.occupants.is_empty()
    }

    pub fn nicknames(&self) -> impl Iterator<Item = &str> {
        self.occupants.keys().map(String::as_str)
    }
}

/// Rosters of every room an account has joined, keyed by bare room address.
#[derive(Debug, Default)]
pub struct RosterBook {
    rooms: HashMap<String, RoomRoster>,
}

impl RosterBook {
    pub fn room(&self, room: &str) -> Option<&RoomRoster> {
        self.rooms.get(room)
    }

    pub fn apply(&mut self, event: MucEvent) -> RosterChange {
        let (room, nickname) = split_occupant_address(&event.from);
        let room = room.to_string();

        match event.info {
            MucEventInfo::OccupantJoined {
                real_address,
                affiliation,
                role,
                status,
            } => {
                let Some(nickname) = nickname else {
                    warn!(from = %event.from, "occupant joined event without nickname");
                    return RosterChange::Ignored;
                };
                debug!(%room, nickname, ?affiliation, ?role, "room joined event received");
                self.rooms.entry(room.clone()).or_default().occupants.insert(
                    nickname.to_string(),
                    Occupant {
                        nickname: nickname.to_string(),
                        real_address,
                        affiliation,
                        role,
                        status,
                    },
                );
                RosterChange::Joined {
                    room,
                    nickname: nickname.to_string(),
                }
            }
            MucEventInfo::OccupantUpdated { affiliation, role } => {
                let Some(nickname) = nickname else {
                    return RosterChange::Ignored;
                };
                debug!(%room, nickname, ?affiliation, ?role, "occupant updated");
                let roster = self.rooms.entry(room.clone()).or_default();
                let occupant = roster
                    .occupants
                    .entry(nickname.to_string())
                    .or_insert_with(|| Occupant {
                        nickname: nickname.to_string(),
                        real_address: None,
                        affiliation,
                        role,
                        status: String::new(),
                    });
                occupant.affiliation = affiliation;
                occupant.role = role;
                RosterChange::Updated {
                    room,
                    nickname: nickname.to_string(),
                }
            }
            MucEventInfo::OccupantLeft { affiliation, role } => {
                let Some(nickname) = nickname else {
                    return RosterChange::Ignored;
                };
                debug!(%room, nickname, ?affiliation, ?role, "occupant left the room");
                let removed = self
                    .rooms
                    .get_mut(&room)
                    .and_then(|roster| roster.occupants.remove(nickname));
                if removed.is_none() {
                    return RosterChange::Ignored;
                }
                RosterChange::Left {
                    room,
                    nickname: nickname.to_string(),
                }
            }
            MucEventInfo::Error { condition } => {
                debug!(%room, %condition, "room error event");
                RosterChange::RoomError { room, condition }
            }
            MucEventInfo::Unsupported(kind) => {
                warn!(from = %event.from, kind = %kind, "unsupported MUC event");
                RosterChange::Ignored
            }
        }
    }
}
