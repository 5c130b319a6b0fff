//! Room discovery sessions: the account-facing contract and its channel plumbing.

use async_trait::async_trait;
use shared::{
    domain::{
        host_of_address, AccountId, DiscoveryRequest, Generation, RoomDetails, RoomRecord,
        ServiceRecord,
    },
    error::DiscoveryError,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// An authenticated chat account able to enumerate the chat rooms reachable from its server.
///
/// `get_rooms` receives the producing half of a fresh set of result streams. It may return as
/// soon as the query is issued and keep producing from a background task; it must not wait for
/// the consumer, which only starts draining after `get_rooms` returns. Every stream closes
/// exactly once: either when the last clone of the [`DiscoverySender`] is dropped after the
/// final record, or through [`DiscoverySender::fail`].
#[async_trait]
pub trait Account: Send + Sync {
    fn id(&self) -> AccountId;

    /// Bare or full account address, e.g. `alice@example.org/desktop`.
    fn address(&self) -> String;

    fn service_host(&self) -> String {
        host_of_address(&self.address()).to_string()
    }

    async fn get_rooms(&self, request: &DiscoveryRequest, results: DiscoverySender);
}

/// A discovered room plus an optional feed of later detail refreshes.
#[derive(Debug)]
pub struct RoomListing {
    pub record: RoomRecord,
    pub updates: Option<mpsc::UnboundedReceiver<RoomDetails>>,
}

impl RoomListing {
    pub fn new(record: RoomRecord) -> Self {
        Self {
            record,
            updates: None,
        }
    }

    pub fn with_updates(record: RoomRecord) -> (Self, RoomListingUpdater) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                record,
                updates: Some(rx),
            },
            RoomListingUpdater { tx },
        )
    }
}

/// Producer side of a room's detail feed.
#[derive(Debug, Clone)]
pub struct RoomListingUpdater {
    tx: mpsc::UnboundedSender<RoomDetails>,
}

impl RoomListingUpdater {
    /// Returns `false` once nobody listens for this room anymore.
    pub fn update(&self, description: impl Into<String>, occupant_count: u32) -> bool {
        self.tx
            .send(RoomDetails {
                description: description.into(),
                occupant_count,
            })
            .is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving halves of one discovery request.
#[derive(Debug)]
pub struct DiscoveryChannels {
    pub services: mpsc::Receiver<ServiceRecord>,
    pub rooms: mpsc::Receiver<RoomListing>,
    pub errors: mpsc::Receiver<DiscoveryError>,
}

impl DiscoveryChannels {
    pub fn bounded(capacity: usize) -> (DiscoverySender, Self) {
        let capacity = capacity.max(1);
        let (services_tx, services) = mpsc::channel(capacity);
        let (rooms_tx, rooms) = mpsc::channel(capacity);
        let (errors_tx, errors) = mpsc::channel(1);
        (
            DiscoverySender {
                services: services_tx,
                rooms: rooms_tx,
                errors: errors_tx,
            },
            Self {
                services,
                rooms,
                errors,
            },
        )
    }
}

/// Producer side of one discovery request.
#[derive(Debug, Clone)]
pub struct DiscoverySender {
    services: mpsc::Sender<ServiceRecord>,
    rooms: mpsc::Sender<RoomListing>,
    errors: mpsc::Sender<DiscoveryError>,
}

impl DiscoverySender {
    pub async fn service(&self, record: ServiceRecord) -> Result<(), DiscoveryError> {
        self.services
            .send(record)
            .await
            .map_err(|_| DiscoveryError::Closed)
    }

    pub async fn room(&self, listing: RoomListing) -> Result<(), DiscoveryError> {
        self.rooms
            .send(listing)
            .await
            .map_err(|_| DiscoveryError::Closed)
    }

    /// Emits the terminal error and drops this handle. Clones stay open until dropped, but
    /// the consumer stops reading records as soon as the error is readable.
    pub async fn fail(self, error: DiscoveryError) {
        if self.errors.send(error).await.is_err() {
            debug!("discovery consumer went away before the error was delivered");
        }
    }

    /// True once the consumer dropped its receivers.
    pub fn is_closed(&self) -> bool {
        self.services.is_closed() && self.rooms.is_closed() && self.errors.is_closed()
    }
}

/// One outstanding discovery request, tagged with the generation it was issued under.
#[derive(Debug)]
pub struct RoomDiscoverySession {
    account_id: AccountId,
    request: DiscoveryRequest,
    generation: Generation,
    cancel: CancellationToken,
    channels: DiscoveryChannels,
}

impl RoomDiscoverySession {
    /// Issues the query on `account`. Returns early when `cancel` fires while the account is
    /// still issuing it; the session's streams are then closed on the producer side.
    pub async fn start(
        account: &dyn Account,
        request: DiscoveryRequest,
        generation: Generation,
        cancel: CancellationToken,
        capacity: usize,
    ) -> Self {
        let account_id = account.id();
        debug!(
            account = %account_id,
            host = %request.service_host,
            custom_service = request.custom_service.as_deref().unwrap_or_default(),
            %generation,
            "opening room discovery session"
        );
        let (results, channels) = DiscoveryChannels::bounded(capacity);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(
                    account = %account_id,
                    %generation,
                    "room query abandoned before it was issued"
                );
            }
            _ = account.get_rooms(&request, results) => {}
        }
        Self {
            account_id,
            request,
            generation,
            cancel,
            channels,
        }
    }

    pub fn account_id(&self) -> &AccountId {
        &self.account_id
    }

    pub fn request(&self) -> &DiscoveryRequest {
        &self.request
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn into_parts(self) -> (DiscoveryRequest, CancellationToken, DiscoveryChannels) {
        (self.request, self.cancel, self.channels)
    }
}
