use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use shared::{
    domain::{AccountId, DiscoveryRequest, RoomRecord, ServiceRecord},
    protocol::ViewEvent,
};
use tokio::sync::mpsc;

use crate::session::{Account, DiscoverySender};

pub type IssuedRequest = (DiscoveryRequest, DiscoverySender);

/// Account whose discovery results are produced by the test through the handed-out senders.
pub struct ManualAccount {
    id: AccountId,
    address: String,
    issued: mpsc::UnboundedSender<IssuedRequest>,
}

impl ManualAccount {
    pub fn new(
        id: &str,
        address: &str,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<IssuedRequest>) {
        let (issued, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                id: AccountId::from(id),
                address: address.to_string(),
                issued,
            }),
            rx,
        )
    }
}

#[async_trait]
impl Account for ManualAccount {
    fn id(&self) -> AccountId {
        self.id.clone()
    }

    fn address(&self) -> String {
        self.address.clone()
    }

    async fn get_rooms(&self, request: &DiscoveryRequest, results: DiscoverySender) {
        let _ = self.issued.send((request.clone(), results));
    }
}

pub fn service(id: &str, name: &str) -> ServiceRecord {
    ServiceRecord::new(id, name)
}

pub fn room(service_id: &str, local_id: &str, name: &str) -> RoomRecord {
    RoomRecord {
        local_id: local_id.into(),
        service_id: service_id.into(),
        service_name: format!("{service_id} rooms"),
        display_name: name.to_string(),
        description: String::new(),
        occupant_count: 0,
    }
}

pub async fn next_event(events: &mut mpsc::UnboundedReceiver<ViewEvent>) -> ViewEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for view event")
        .expect("presenter channel closed")
}

pub async fn next_request(
    requests: &mut mpsc::UnboundedReceiver<IssuedRequest>,
) -> IssuedRequest {
    tokio::time::timeout(Duration::from_secs(2), requests.recv())
        .await
        .expect("timed out waiting for discovery request")
        .expect("account dropped")
}

pub fn drain(events: &mut mpsc::UnboundedReceiver<ViewEvent>) -> Vec<ViewEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
