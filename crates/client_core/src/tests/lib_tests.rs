use std::sync::Arc;

use shared::{domain::Generation, protocol::ViewEvent};
use tokio::sync::mpsc;

use super::*;
use crate::test_support::{drain, next_event, next_request, room, service, ManualAccount};

fn view() -> (Arc<RequestCoordinator>, mpsc::UnboundedReceiver<ViewEvent>) {
    let (presenter, events) = ChannelPresenter::new();
    (
        RequestCoordinator::new(ViewModelSink::new(presenter), DiscoveryConfig::default()),
        events,
    )
}

fn started_generations(events: &[ViewEvent]) -> Vec<Generation> {
    events
        .iter()
        .filter_map(|event| match event {
            ViewEvent::DiscoveryStarted { generation } => Some(*generation),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn burst_of_triggers_leaves_only_the_newest_session_applied() {
    let (coordinator, mut events) = view();
    let (alice, mut requests) = ManualAccount::new("alice", "alice@example.org");

    let mut handles = vec![coordinator.open(vec![alice]).await.expect("started")];
    let (_, first_sender) = next_request(&mut requests).await;
    for _ in 0..3 {
        handles.push(coordinator.refresh().await.expect("refresh"));
    }
    let newest = handles.pop().expect("newest handle");

    for handle in handles {
        let outcome = handle.await.expect("join");
        assert!(
            matches!(
                outcome,
                SessionOutcome::Superseded
                    | SessionOutcome::Finished {
                        outcome: AggregateOutcome::Cancelled,
                        ..
                    }
            ),
            "older session was not replaced: {outcome:?}"
        );
    }

    let _ = first_sender
        .service(service("svc-old.example.org", "svc-old"))
        .await;

    let newest_sender = loop {
        let (_, sender) = next_request(&mut requests).await;
        if !sender.is_closed() {
            break sender;
        }
        let _ = sender
            .service(service("svc-cancelled.example.org", "svc-cancelled"))
            .await;
    };
    newest_sender
        .service(service("svc-newest.example.org", "svc-newest"))
        .await
        .expect("newest session is listening");
    drop(newest_sender);

    let SessionOutcome::Finished {
        generation,
        outcome,
    } = newest.await.expect("join")
    else {
        panic!("newest session must run");
    };
    assert_eq!(
        outcome,
        AggregateOutcome::Completed {
            services: 1,
            rooms: 0
        }
    );

    let snapshot = coordinator.sink().snapshot().await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].record.display_name, "svc-newest");

    let events = drain(&mut events);
    assert_eq!(started_generations(&events).last(), Some(&generation));
    assert_eq!(
        events
            .iter()
            .filter(|event| matches!(event, ViewEvent::ServiceAppended { .. }))
            .count(),
        1
    );
}

#[tokio::test]
async fn reissue_before_first_result_discards_the_cancelled_session() {
    let (coordinator, mut events) = view();
    let (alice, mut requests) = ManualAccount::new("alice", "alice@example.org");

    let first = coordinator.open(vec![alice]).await.expect("started");
    let (_, first_sender) = next_request(&mut requests).await;
    let second = coordinator.refresh().await.expect("refresh");

    let _ = first_sender
        .room(RoomListing::new(room("old.example.org", "stale", "Stale")))
        .await;
    let SessionOutcome::Finished {
        generation: first_generation,
        outcome,
    } = first.await.expect("join")
    else {
        panic!("first session had already started");
    };
    assert_eq!(outcome, AggregateOutcome::Cancelled);

    let (_, second_sender) = next_request(&mut requests).await;
    second_sender
        .room(RoomListing::new(room("new.example.org", "fresh", "Fresh")))
        .await
        .expect("send");
    drop(second_sender);
    let SessionOutcome::Finished {
        generation: second_generation,
        ..
    } = second.await.expect("join")
    else {
        panic!("second session must run");
    };
    assert!(second_generation > first_generation);

    let snapshot = coordinator.sink().snapshot().await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].record.service_id.as_str(), "new.example.org");
    assert_eq!(snapshot[0].rooms[0].record.local_id.as_str(), "fresh");

    let events = drain(&mut events);
    assert_eq!(
        started_generations(&events),
        vec![first_generation, second_generation]
    );
    let second_start = events
        .iter()
        .position(|event| *event == ViewEvent::DiscoveryStarted { generation: second_generation })
        .expect("second start");
    assert!(events[..second_start].iter().all(|event| matches!(
        event,
        ViewEvent::DiscoveryStarted { .. }
    )));
}

#[tokio::test]
async fn late_room_patch_from_superseded_session_is_ignored() {
    let (coordinator, mut events) = view();
    let (alice, mut requests) = ManualAccount::new("alice", "alice@example.org");

    let first = coordinator.open(vec![alice]).await.expect("started");
    let (_, first_sender) = next_request(&mut requests).await;
    let (listing, updater) = RoomListing::with_updates(room("a.example.org", "lobby", "Lobby"));
    first_sender.room(listing).await.expect("send");

    let stale_token = loop {
        if let ViewEvent::RoomAppended { token, .. } = next_event(&mut events).await {
            break token;
        }
    };

    let second = coordinator.refresh().await.expect("refresh");
    first.await.expect("join");
    let (_, second_sender) = next_request(&mut requests).await;
    second_sender
        .room(RoomListing::new(room("b.example.org", "hall", "Hall")))
        .await
        .expect("send");
    drop(second_sender);
    second.await.expect("join");
    drain(&mut events);

    updater.update("late description", 99);
    let patched = coordinator
        .sink()
        .patch_room(
            stale_token,
            shared::domain::RoomDetails {
                description: "direct".to_string(),
                occupant_count: 1,
            },
        )
        .await;
    assert!(!patched);
    tokio::task::yield_now().await;

    let snapshot = coordinator.sink().snapshot().await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].rooms[0].record.display_name, "Hall");
    assert_eq!(snapshot[0].rooms[0].record.description, "");
    assert!(!drain(&mut events)
        .iter()
        .any(|event| matches!(event, ViewEvent::RoomPatched { .. })));
}
