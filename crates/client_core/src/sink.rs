//! The room tree of one browser view and the presenter it reports changes to.

use std::{collections::HashMap, sync::Arc};

use shared::{
    domain::{Generation, RoomDetails, RoomRecord, ServiceId, ServiceRecord},
    error::NoResultsReason,
    protocol::{RoomToken, TreeHandle, ViewEvent},
};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace, warn};

use crate::generation::GenerationGuard;

/// Presentation collaborator. `dispatch` is called with the sink lock held, so
/// implementations must hand the event off (e.g. to a UI queue) instead of blocking.
pub trait Presenter: Send + Sync {
    fn dispatch(&self, event: ViewEvent);
}

impl<F> Presenter for F
where
    F: Fn(ViewEvent) + Send + Sync,
{
    fn dispatch(&self, event: ViewEvent) {
        self(event)
    }
}

/// Presenter that forwards events onto an unbounded tokio channel.
pub struct ChannelPresenter {
    tx: mpsc::UnboundedSender<ViewEvent>,
}

impl ChannelPresenter {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ViewEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl Presenter for ChannelPresenter {
    fn dispatch(&self, event: ViewEvent) {
        if self.tx.send(event).is_err() {
            trace!("view event receiver dropped");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomNode {
    pub record: RoomRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceNode {
    pub record: ServiceRecord,
    pub rooms: Vec<RoomNode>,
}

/// Services in first-seen order, each with its rooms in insertion order.
#[derive(Debug, Default)]
pub struct ViewTree {
    services: Vec<ServiceNode>,
    index: HashMap<ServiceId, usize>,
}

impl ViewTree {
    fn clear(&mut self) {
        self.services.clear();
        self.index.clear();
    }

    fn upsert_service(&mut self, record: ServiceRecord) -> (TreeHandle, bool) {
        if let Some(&service) = self.index.get(&record.service_id) {
            return (TreeHandle::Service { service }, false);
        }
        let service = self.services.len();
        self.index.insert(record.service_id.clone(), service);
        self.services.push(ServiceNode {
            record,
            rooms: Vec::new(),
        });
        (TreeHandle::Service { service }, true)
    }

    fn insert_room(&mut self, record: RoomRecord, service: usize) -> Option<TreeHandle> {
        let node = self.services.get_mut(service)?;
        let room = node.rooms.len();
        node.rooms.push(RoomNode { record });
        Some(TreeHandle::Room { service, room })
    }

    fn room_mut(&mut self, service: usize, room: usize) -> Option<&mut RoomNode> {
        self.services.get_mut(service)?.rooms.get_mut(room)
    }

    pub fn services(&self) -> &[ServiceNode] {
        &self.services
    }

    pub fn room_count(&self) -> usize {
        self.services.iter().map(|service| service.rooms.len()).sum()
    }
}

/// A normalized update produced by the fan-in loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkOp {
    Service(ServiceRecord),
    Room(RoomRecord),
    Reveal,
    NoResults(NoResultsReason),
    ReportError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Stale,
    Service(TreeHandle),
    Room { handle: TreeHandle, token: RoomToken },
    Notified,
}

struct SinkState {
    guard: GenerationGuard,
    tree: ViewTree,
}

impl SinkState {
    fn upsert_service(&mut self, record: ServiceRecord, presenter: &dyn Presenter) -> TreeHandle {
        let service_id = record.service_id.clone();
        let name = record.display_name.clone();
        let (handle, inserted) = self.tree.upsert_service(record);
        if inserted {
            presenter.dispatch(ViewEvent::ServiceAppended { service_id, name });
        }
        handle
    }

    fn insert_room(
        &mut self,
        record: RoomRecord,
        parent: TreeHandle,
        presenter: &dyn Presenter,
    ) -> Option<(TreeHandle, RoomToken)> {
        let TreeHandle::Service { service } = parent else {
            warn!(?parent, "rooms can only be attached to service nodes");
            return None;
        };
        let parent_id = self.tree.services.get(service)?.record.service_id.clone();
        let local_id = record.local_id.clone();
        let name = record.display_name.clone();
        let handle = self.tree.insert_room(record, service)?;
        let TreeHandle::Room { room, .. } = handle else {
            return None;
        };
        let token = RoomToken {
            generation: self.guard.current(),
            service,
            room,
        };
        presenter.dispatch(ViewEvent::RoomAppended {
            parent_id,
            local_id,
            name,
            token,
        });
        Some((handle, token))
    }
}

/// Applies discovery results to the room tree, dropping anything from a stale generation.
///
/// The generation counter lives under the same lock as the tree, so every apply re-reads it
/// right before mutating.
pub struct ViewModelSink {
    state: Mutex<SinkState>,
    presenter: Arc<dyn Presenter>,
}

impl ViewModelSink {
    pub fn new(presenter: Arc<dyn Presenter>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SinkState {
                guard: GenerationGuard::new(),
                tree: ViewTree::default(),
            }),
            presenter,
        })
    }

    pub async fn current_generation(&self) -> Generation {
        self.state.lock().await.guard.current()
    }

    /// Advances the generation and clears the tree in one critical section.
    pub async fn begin_generation(&self) -> Generation {
        let mut state = self.state.lock().await;
        let generation = state.guard.advance();
        state.tree.clear();
        self.presenter
            .dispatch(ViewEvent::DiscoveryStarted { generation });
        debug!(%generation, "room tree reset for new discovery generation");
        generation
    }

    /// Empties the tree without notifying the presenter. The generation still advances, so
    /// tokens and in-flight operations from before the reset are stale.
    pub async fn reset(&self) -> Generation {
        let mut state = self.state.lock().await;
        state.tree.clear();
        state.guard.advance()
    }

    /// Invalidates whatever is in flight and tells the presenter there is nothing to browse with.
    pub async fn show_no_accounts(&self) {
        let mut state = self.state.lock().await;
        state.guard.advance();
        state.tree.clear();
        self.presenter.dispatch(ViewEvent::NoAccounts);
    }

    pub async fn apply(&self, generation: Generation, op: SinkOp) -> Applied {
        let mut state = self.state.lock().await;
        if state.guard.is_stale(generation) {
            trace!(%generation, current = %state.guard.current(), ?op, "dropping stale view update");
            return Applied::Stale;
        }
        let presenter = self.presenter.as_ref();
        match op {
            SinkOp::Service(record) => Applied::Service(state.upsert_service(record, presenter)),
            SinkOp::Room(record) => {
                let parent = state.upsert_service(record.service_record(), presenter);
                match state.insert_room(record, parent, presenter) {
                    Some((handle, token)) => Applied::Room { handle, token },
                    None => Applied::Stale,
                }
            }
            SinkOp::Reveal => {
                presenter.dispatch(ViewEvent::RevealResults);
                Applied::Notified
            }
            SinkOp::NoResults(reason) => {
                presenter.dispatch(ViewEvent::NoResults { reason });
                Applied::Notified
            }
            SinkOp::ReportError(message) => {
                presenter.dispatch(ViewEvent::ReportError { message });
                Applied::Notified
            }
        }
    }

    pub async fn upsert_service(
        &self,
        generation: Generation,
        record: ServiceRecord,
    ) -> Option<TreeHandle> {
        match self.apply(generation, SinkOp::Service(record)).await {
            Applied::Service(handle) => Some(handle),
            _ => None,
        }
    }

    pub async fn insert_room(
        &self,
        generation: Generation,
        record: RoomRecord,
        parent: TreeHandle,
    ) -> Option<(TreeHandle, RoomToken)> {
        let mut state = self.state.lock().await;
        if state.guard.is_stale(generation) {
            trace!(%generation, "dropping stale room insertion");
            return None;
        }
        state.insert_room(record, parent, self.presenter.as_ref())
    }

    /// Refreshes a listed room. Returns `false` when the token no longer refers to the current tree.
    pub async fn patch_room(&self, token: RoomToken, details: RoomDetails) -> bool {
        let mut state = self.state.lock().await;
        if state.guard.is_stale(token.generation) {
            trace!(generation = %token.generation, "ignoring room patch from superseded generation");
            return false;
        }
        let Some(node) = state.tree.room_mut(token.service, token.room) else {
            warn!(?token, "room patch for unknown tree position");
            return false;
        };
        node.record.description = details.description.clone();
        node.record.occupant_count = details.occupant_count;
        self.presenter.dispatch(ViewEvent::RoomPatched {
            token,
            description: details.description,
            occupant_count: details.occupant_count,
        });
        true
    }

    pub async fn snapshot(&self) -> Vec<ServiceNode> {
        self.state.lock().await.tree.services().to_vec()
    }

    pub async fn room_count(&self) -> usize {
        self.state.lock().await.tree.room_count()
    }
}

#[cfg(test)]
#[path = "tests/sink_tests.rs"]
mod tests;
