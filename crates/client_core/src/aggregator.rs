//! Merges the three result streams of a discovery session into ordered view updates.

use std::sync::Arc;

use shared::{
    domain::{Generation, RoomDetails, ServiceRecord},
    error::{DiscoveryError, NoResultsReason},
    protocol::RoomToken,
};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::{
    session::{DiscoveryChannels, RoomDiscoverySession, RoomListing},
    sink::{Applied, SinkOp, ViewModelSink},
};

pub const DISCOVERY_ERROR_MESSAGE: &str = "Something went wrong when trying to get chat rooms";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateOutcome {
    Completed { services: usize, rooms: usize },
    Failed(DiscoveryError),
    Cancelled,
    /// The view moved on to a newer generation while this session was still delivering.
    Superseded,
}

pub struct FanInAggregator {
    sink: Arc<ViewModelSink>,
    generation: Generation,
    custom_service: bool,
    has_results: bool,
    services_seen: usize,
    rooms_seen: usize,
}

impl FanInAggregator {
    pub fn new(sink: Arc<ViewModelSink>, generation: Generation) -> Self {
        Self {
            sink,
            generation,
            custom_service: false,
            has_results: false,
            services_seen: 0,
            rooms_seen: 0,
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Drains the session until it is cancelled, fails, or all three streams are closed.
    ///
    /// A queued error wins over queued records: nothing is applied once it is readable.
    pub async fn run(mut self, session: RoomDiscoverySession) -> AggregateOutcome {
        let account = session.account_id().clone();
        let (request, cancel, channels) = session.into_parts();
        self.custom_service = request.has_custom_service();
        let DiscoveryChannels {
            mut services,
            mut rooms,
            mut errors,
        } = channels;
        let (mut services_open, mut rooms_open, mut errors_open) = (true, true, true);

        let outcome = loop {
            if !services_open && !rooms_open && !errors_open {
                break AggregateOutcome::Completed {
                    services: self.services_seen,
                    rooms: self.rooms_seen,
                };
            }

            let applied = tokio::select! {
                biased;
                _ = cancel.cancelled() => break AggregateOutcome::Cancelled,
                error = errors.recv(), if errors_open => match error {
                    Some(error) => {
                        self.on_error(&error).await;
                        break AggregateOutcome::Failed(error);
                    }
                    None => {
                        errors_open = false;
                        continue;
                    }
                },
                record = services.recv(), if services_open => match record {
                    Some(record) => self.on_service(record).await,
                    None => {
                        services_open = false;
                        continue;
                    }
                },
                listing = rooms.recv(), if rooms_open => match listing {
                    Some(listing) => self.on_room(listing).await,
                    None => {
                        rooms_open = false;
                        continue;
                    }
                },
            };

            if applied == Applied::Stale {
                break AggregateOutcome::Superseded;
            }
        };

        if matches!(outcome, AggregateOutcome::Completed { .. }) && !self.has_results {
            let reason = if self.custom_service {
                NoResultsReason::EmptyCustomService
            } else {
                NoResultsReason::NoServices
            };
            self.sink
                .apply(self.generation, SinkOp::NoResults(reason))
                .await;
        }

        info!(
            account = %account,
            generation = %self.generation,
            services = self.services_seen,
            rooms = self.rooms_seen,
            ?outcome,
            "room discovery session finished"
        );
        outcome
    }

    async fn reveal_once(&mut self) -> Applied {
        if self.has_results {
            return Applied::Notified;
        }
        self.has_results = true;
        self.sink.apply(self.generation, SinkOp::Reveal).await
    }

    async fn on_service(&mut self, record: ServiceRecord) -> Applied {
        self.services_seen += 1;
        if self.reveal_once().await == Applied::Stale {
            return Applied::Stale;
        }
        self.sink
            .apply(self.generation, SinkOp::Service(record))
            .await
    }

    async fn on_room(&mut self, listing: RoomListing) -> Applied {
        self.rooms_seen += 1;
        if self.reveal_once().await == Applied::Stale {
            return Applied::Stale;
        }
        let RoomListing { record, updates } = listing;
        let applied = self.sink.apply(self.generation, SinkOp::Room(record)).await;
        if let (Applied::Room { token, .. }, Some(updates)) = (applied, updates) {
            tokio::spawn(forward_room_updates(Arc::clone(&self.sink), token, updates));
        }
        applied
    }

    async fn on_error(&mut self, error: &DiscoveryError) {
        debug!(generation = %self.generation, %error, "something went wrong trying to get chat rooms");
        self.sink
            .apply(
                self.generation,
                SinkOp::ReportError(DISCOVERY_ERROR_MESSAGE.to_string()),
            )
            .await;
    }
}

/// Routes detail refreshes for one listed room until the room's generation is superseded.
async fn forward_room_updates(
    sink: Arc<ViewModelSink>,
    token: RoomToken,
    mut updates: mpsc::UnboundedReceiver<RoomDetails>,
) {
    while let Some(details) = updates.recv().await {
        if !sink.patch_room(token, details).await {
            break;
        }
    }
    debug!(generation = %token.generation, "room listing update feed closed");
}

#[cfg(test)]
#[path = "tests/aggregator_tests.rs"]
mod tests;
