use bytes::Bytes;
use cluster::{Escalation, FailureDetector, NodeConfig};
use corelib::ring::{Direction, RingState, SharedRingState};
use corelib::NodeId;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use transport::Broker;

fn n(i: u64) -> NodeId {
    NodeId::from_index(i)
}

fn ring_of(local: u64, members: &[u64]) -> SharedRingState {
    let now = Instant::now().into_std();
    let ring = RingState::shared(n(local), now);
    {
        let mut state = ring.lock();
        for m in members {
            state.add_member(n(*m));
        }
        state.recompute(now).unwrap();
    }
    ring
}

fn detector(broker: &Broker, ring: &SharedRingState) -> FailureDetector {
    let local = ring.lock().local().clone();
    let (client, _rx) = broker.connect(local.to_string());
    FailureDetector::new(ring.clone(), Arc::new(client), &NodeConfig::new(local))
}

#[tokio::test(start_paused = true)]
async fn test_four_misses_keep_fifth_evicts() {
    let broker = Broker::new();
    let ring = ring_of(1, &[1, 2, 3]);
    let detector = detector(&broker, &ring);

    for expected in 1..=4 {
        assert_eq!(
            detector.escalate(Direction::Successor).await,
            Escalation::Counted {
                node: n(2),
                misses: expected
            }
        );
    }
    assert!(ring.lock().contains(&n(2)));

    let started = Instant::now();
    assert_eq!(
        detector.escalate(Direction::Successor).await,
        Escalation::Evicted(n(2))
    );
    assert_eq!(started.elapsed(), Duration::from_secs(2));

    let state = ring.lock();
    assert_eq!(state.members(), vec![n(1), n(3)]);
    assert_eq!(state.successor(), Some(&n(3)));
    assert_eq!(
        broker.retained("ring_discovery/N2"),
        Some(Bytes::from_static(b"leave:N2"))
    );
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_escalation_is_dropped() {
    let broker = Broker::new();
    let ring = ring_of(2, &[1, 2, 3]);
    let detector = detector(&broker, &ring);
    for _ in 0..4 {
        detector.escalate(Direction::Predecessor).await;
    }

    let (first, second) = tokio::join!(
        detector.escalate(Direction::Predecessor),
        detector.escalate(Direction::Predecessor)
    );
    assert_eq!(first, Escalation::Evicted(n(1)));
    assert_eq!(second, Escalation::Busy);
    assert_eq!(ring.lock().predecessor(), Some(&n(3)));
}

#[tokio::test(start_paused = true)]
async fn test_directions_are_independent() {
    let broker = Broker::new();
    let ring = ring_of(2, &[1, 2, 3]);
    let detector = detector(&broker, &ring);

    detector.escalate(Direction::Successor).await;
    detector.escalate(Direction::Successor).await;
    detector.escalate(Direction::Predecessor).await;

    let state = ring.lock();
    assert_eq!(state.failures(Direction::Successor, &n(3)), 2);
    assert_eq!(state.failures(Direction::Predecessor, &n(1)), 1);
}

#[tokio::test(start_paused = true)]
async fn test_silent_neighbours_evicted_by_ticks() {
    let broker = Broker::new();
    let ring = ring_of(1, &[1, 2]);
    let detector = Arc::new(detector(&broker, &ring));
    tokio::spawn(Arc::clone(&detector).run());

    // Nobody answers: first miss after 30 s, fifth after 70 s, then the delay.
    tokio::time::sleep(Duration::from_secs(69)).await;
    assert!(ring.lock().contains(&n(2)));
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(ring.lock().members(), vec![n(1)]);
}
