use cluster::{Node, NodeConfig, NodeError, NodeHandle};
use corelib::{NodeId, Record};
use std::sync::Arc;
use std::time::Duration;
use transport::{Broker, Transport};

fn n(i: u64) -> NodeId {
    NodeId::from_index(i)
}

async fn start(broker: &Broker, config: NodeConfig) -> NodeHandle {
    let (client, deliveries) = broker.connect(config.node_id.to_string());
    let node = Node::new(config, Arc::new(client)).unwrap();
    node.start(deliveries).await.unwrap()
}

async fn start_plain(broker: &Broker, id: u64) -> NodeHandle {
    start(broker, NodeConfig::new(n(id))).await
}

/// Let in-flight deliveries drain.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

// ============================================================================
// Ring formation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_late_joiner_sees_whole_directory() {
    let broker = Broker::new();
    let h1 = start_plain(&broker, 1).await;
    let h2 = start_plain(&broker, 2).await;
    settle().await;
    let h3 = start_plain(&broker, 3).await;
    settle().await;

    for handle in [&h1, &h2, &h3] {
        assert_eq!(handle.node().members(), vec![n(1), n(2), n(3)]);
    }
    let view = h3.node().view().unwrap();
    assert_eq!((view.predecessor, view.successor), (n(2), n(1)));
}

#[tokio::test(start_paused = true)]
async fn test_two_node_ring_is_symmetric() {
    let broker = Broker::new();
    let h1 = start_plain(&broker, 1).await;
    let h2 = start_plain(&broker, 2).await;
    settle().await;

    let v1 = h1.node().view().unwrap();
    let v2 = h2.node().view().unwrap();
    assert_eq!((v1.predecessor, v1.successor), (n(2), n(2)));
    assert_eq!((v2.predecessor, v2.successor), (n(1), n(1)));

    // Healthy heartbeats keep both sides in the ring.
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h1.node().members(), vec![n(1), n(2)]);
    assert_eq!(h2.node().members(), vec![n(1), n(2)]);
}

// ============================================================================
// Replication and crash recovery
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_replicate_then_evict_crashed_node() {
    let broker = Broker::new();
    let h1 = start_plain(&broker, 1).await;
    let h2 = start_plain(&broker, 2).await;
    let h3 = start_plain(&broker, 3).await;
    settle().await;

    let record = Record::new(&n(2), "Rust 2.0", "released", "tech");
    h2.node().publish(record.clone()).await.unwrap();
    settle().await;

    // N3 holds the backup and does not forward it to N1.
    assert!(h3.node().store().lock().contains(&record.id));
    assert!(!h1.node().store().lock().contains(&record.id));

    broker.disconnect("N2");
    h2.shutdown();
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(h1.node().members(), vec![n(1), n(3)]);
    assert_eq!(h3.node().members(), vec![n(1), n(3)]);
    let v1 = h1.node().view().unwrap();
    assert_eq!((v1.predecessor, v1.successor), (n(3), n(3)));
    let v3 = h3.node().view().unwrap();
    assert_eq!((v3.predecessor, v3.successor), (n(1), n(1)));
    assert_eq!(
        broker.retained("ring_discovery/N2").as_deref(),
        Some(&b"leave:N2"[..])
    );
}

// ============================================================================
// Records, subscriptions and deletion
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_subscribed_topics_receive_records() {
    let broker = Broker::new();
    let h1 = start(&broker, NodeConfig::new(n(1)).with_topics(["tech"])).await;
    let h2 = start(&broker, NodeConfig::new(n(2)).with_topics(["tech", "sport"])).await;
    settle().await;

    let tech = Record::new(&n(1), "t", "c", "tech");
    let sport = Record::new(&n(2), "s", "c", "sport");
    h1.node().publish(tech.clone()).await.unwrap();
    settle().await;
    h2.node().publish(sport.clone()).await.unwrap();
    settle().await;

    assert_eq!(h2.node().records_for_subscriptions(), vec![tech.clone(), sport.clone()]);
    assert!(h1.node().unsubscribe_topic("tech").await.unwrap());
    assert!(h1.node().records_for_subscriptions().is_empty());
    assert_eq!(h1.node().subscribed_topics(), Vec::<String>::new());
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_publish_is_a_no_op() {
    let broker = Broker::new();
    let h1 = start(&broker, NodeConfig::new(n(1)).with_topics(["tech"])).await;
    let record = Record::new(&n(1), "t", "c", "tech");

    assert!(h1.node().publish(record.clone()).await.unwrap().is_new());
    assert!(h1.node().publish(record).await.unwrap().is_duplicate());
    settle().await;
    assert_eq!(h1.node().records().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_publish_can_be_retried() {
    let broker = Broker::new();
    let (observer, mut inbox) = broker.connect("observer");
    observer.subscribe("tech").await.unwrap();
    let h1 = start_plain(&broker, 1).await;
    settle().await;
    while inbox.try_recv().is_ok() {}

    let record = Record::new(&n(1), "t", "c", "tech");
    broker.fail_next_publishes("N1", 1);
    assert!(h1.node().publish(record.clone()).await.is_err());
    assert!(!h1.node().store().lock().contains(&record.id));

    assert!(h1.node().publish(record.clone()).await.unwrap().is_new());
    settle().await;
    let delivery = inbox.try_recv().unwrap();
    assert_eq!(delivery.topic, "tech");
    let json = std::str::from_utf8(&delivery.payload).unwrap();
    assert_eq!(Record::from_json(json).unwrap(), record);
}

#[tokio::test(start_paused = true)]
async fn test_publish_on_reserved_topic_is_rejected() {
    let broker = Broker::new();
    let h1 = start_plain(&broker, 1).await;
    for topic in ["ring_heartbeat", "replicate/N3", "ring_discovery/N2", "#"] {
        let record = Record::new(&n(1), "t", "c", topic);
        assert!(matches!(
            h1.node().publish(record).await,
            Err(NodeError::ReservedTopic(_))
        ));
    }
    assert!(h1.node().records().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_delete_spreads_to_subscribers() {
    let broker = Broker::new();
    let h1 = start(&broker, NodeConfig::new(n(1)).with_topics(["tech"])).await;
    let h2 = start(&broker, NodeConfig::new(n(2)).with_topics(["tech"])).await;
    settle().await;

    let record = Record::new(&n(1), "t", "c", "tech");
    h1.node().publish(record.clone()).await.unwrap();
    settle().await;
    assert!(h2.node().store().lock().contains(&record.id));

    h1.node().delete(&record.id).await.unwrap();
    settle().await;
    assert!(!h1.node().store().lock().contains(&record.id));
    assert!(!h2.node().store().lock().contains(&record.id));
}

#[tokio::test(start_paused = true)]
async fn test_delete_of_foreign_record_is_rejected() {
    let broker = Broker::new();
    let h1 = start_plain(&broker, 1).await;
    let err = h1.node().delete("N2:1234").await.unwrap_err();
    assert!(matches!(err, NodeError::NotOwner { ref owner, .. } if owner == "N2"));
}

#[tokio::test(start_paused = true)]
async fn test_reserved_topic_cannot_be_subscribed() {
    let broker = Broker::new();
    let h1 = start_plain(&broker, 1).await;
    assert!(matches!(
        h1.node().subscribe_topic("ring_heartbeat").await,
        Err(NodeError::ReservedTopic(_))
    ));
}

// ============================================================================
// Durable log
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_restart_replays_without_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("N1.log");
    let config = NodeConfig::new(n(1)).with_log_path(&log);

    let kept = Record::new(&n(1), "kept", "c", "tech");
    let dropped = Record::new(&n(1), "dropped", "c", "tech");
    {
        let broker = Broker::new();
        let h1 = start(&broker, config.clone()).await;
        h1.node().publish(kept.clone()).await.unwrap();
        h1.node().publish(dropped.clone()).await.unwrap();
        h1.node().delete(&dropped.id).await.unwrap();
        h1.shutdown();
    }
    let lines_before = std::fs::read_to_string(&log).unwrap().lines().count();
    assert_eq!(lines_before, 3);

    let broker = Broker::new();
    let (observer, mut copies) = broker.connect("observer");
    observer.subscribe("replicate/#").await.unwrap();
    start_plain(&broker, 2).await;
    let h1 = start(&broker, config).await;
    settle().await;

    let store = h1.node().store().lock();
    assert!(store.contains(&kept.id));
    assert!(!store.contains(&dropped.id));
    assert_eq!(store.len(), 2);
    drop(store);

    assert!(copies.try_recv().is_err());
    let lines_after = std::fs::read_to_string(&log).unwrap().lines().count();
    assert_eq!(lines_after, lines_before);
}
