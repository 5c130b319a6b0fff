//! Public room discovery for the chat client: sessions against an account, the fan-in loop
//! that merges their result streams, and the generation-guarded room tree they feed.

pub mod aggregator;
pub mod coordinator;
pub mod generation;
pub mod roster;
pub mod session;
pub mod sink;

pub use aggregator::{AggregateOutcome, FanInAggregator, DISCOVERY_ERROR_MESSAGE};
pub use coordinator::{CoordinatorError, DiscoveryConfig, RequestCoordinator, SessionOutcome};
pub use generation::GenerationGuard;
pub use roster::{MucEvent, MucEventInfo, Occupant, RosterBook, RosterChange};
pub use session::{
    Account, DiscoveryChannels, DiscoverySender, RoomDiscoverySession, RoomListing,
    RoomListingUpdater,
};
pub use sink::{
    Applied, ChannelPresenter, Presenter, RoomNode, ServiceNode, SinkOp, ViewModelSink, ViewTree,
};

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
