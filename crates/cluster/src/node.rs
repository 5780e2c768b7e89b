//! Node controller.
//!
//! A [`Node`] owns the ring state, the record store and the protocol
//! handlers, and routes every transport delivery to one of them through a
//! bounded pool of workers. Starting a node replays its durable log,
//! subscribes to the control channels and its application topics, announces
//! it on the ring and spawns the detector and dispatch loops.

use crate::config::NodeConfig;
use crate::detector::{now, FailureDetector};
use crate::error::NodeError;
use crate::membership::Membership;
use bytes::Bytes;
use corelib::record::origin_of;
use corelib::ring::{RingState, RingView, SharedRingState};
use corelib::store::{Acceptance, Ingest, RecordStore, SharedStore};
use corelib::{NodeId, Record, DELETION_TOPIC};
use parking_lot::Mutex;
use replication::ReplicationEngine;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};
use transport::protocol::{
    replicate_channel, DISCOVERY_CHANNEL, DISCOVERY_WILDCARD, HEARTBEAT_CHANNEL, REPLICATE_PREFIX,
};
use transport::{Delivery, Inbound, Transport};

pub struct Node {
    config: NodeConfig,
    transport: Arc<dyn Transport>,
    ring: SharedRingState,
    store: SharedStore,
    detector: Arc<FailureDetector>,
    membership: Membership,
    replication: ReplicationEngine,
    topics: Mutex<BTreeSet<String>>,
}

impl Node {
    /// Build a node. Opens the durable log if one is configured; nothing is
    /// published until [`start`](Self::start).
    pub fn new(config: NodeConfig, transport: Arc<dyn Transport>) -> Result<Arc<Self>, NodeError> {
        let local = config.node_id.clone();
        let store = match &config.log_path {
            Some(path) => RecordStore::open(path)?,
            None => RecordStore::new(),
        };
        let ring = RingState::shared(local.clone(), now());

        Ok(Arc::new(Self {
            detector: Arc::new(FailureDetector::new(ring.clone(), transport.clone(), &config)),
            membership: Membership::new(local.clone(), ring.clone(), transport.clone()),
            replication: ReplicationEngine::new(local, transport.clone(), config.retry_policy()),
            store: store.shared(),
            ring,
            transport,
            topics: Mutex::new(BTreeSet::new()),
            config,
        }))
    }

    /// Bring the node onto the ring and start processing `deliveries`.
    pub async fn start(
        self: &Arc<Self>,
        deliveries: mpsc::UnboundedReceiver<Delivery>,
    ) -> Result<NodeHandle, NodeError> {
        let span = info_span!("node", id = %self.id());

        async {
            let replayed = self.store.lock().replay()?;
            if replayed > 0 {
                info!(replayed, "replayed durable log");
            }

            for channel in [
                HEARTBEAT_CHANNEL.to_string(),
                DISCOVERY_WILDCARD.to_string(),
                replicate_channel(self.id()),
                DELETION_TOPIC.to_string(),
            ] {
                self.transport.subscribe(&channel).await?;
            }
            for topic in self.config.topics.clone() {
                self.subscribe_topic(&topic).await?;
            }

            self.membership.announce().await?;
            Ok::<_, NodeError>(())
        }
        .instrument(span.clone())
        .await?;

        let detector = tokio::spawn(Arc::clone(&self.detector).run().instrument(span.clone()));
        let dispatch = tokio::spawn(Arc::clone(self).dispatch(deliveries).instrument(span));

        Ok(NodeHandle {
            node: Arc::clone(self),
            tasks: vec![detector, dispatch],
        })
    }

    async fn dispatch(self: Arc<Self>, mut deliveries: mpsc::UnboundedReceiver<Delivery>) {
        let workers = Arc::new(Semaphore::new(self.config.worker_pool_size.max(1)));
        while let Some(delivery) = deliveries.recv().await {
            let Ok(permit) = Arc::clone(&workers).acquire_owned().await else {
                break;
            };
            let node = Arc::clone(&self);
            tokio::spawn(
                async move {
                    node.handle_delivery(delivery).await;
                    drop(permit);
                }
                .in_current_span(),
            );
        }
        debug!("delivery stream closed");
    }

    /// Route one delivery to the handler for its channel.
    pub async fn handle_delivery(&self, delivery: Delivery) {
        match Inbound::classify(&delivery.topic, &delivery.payload) {
            Ok(Inbound::Heartbeat(message)) => self.detector.handle_heartbeat(message).await,
            Ok(Inbound::Discovery(message)) => self.membership.handle(message).await,
            Ok(Inbound::Replica(record)) => {
                self.ingest(record, Ingest::Replica).await;
            }
            Ok(Inbound::Application(record)) => {
                self.ingest(record, Ingest::Arrival).await;
            }
            Err(err) => warn!(topic = %delivery.topic, error = %err, "dropping delivery"),
        }
    }

    async fn ingest(&self, record: Record, ingest: Ingest) -> Acceptance {
        let acceptance = self.store.lock().accept(record.clone(), ingest);
        if acceptance.should_replicate() {
            self.replicate(&record).await;
        }
        acceptance
    }

    async fn replicate(&self, record: &Record) {
        let view = self.view();
        if let Err(err) = self.replication.replicate(record, view.as_ref()).await {
            warn!(record = %record.id, error = %err, "replication skipped");
        }
    }

    /// Originate `record` on this node.
    ///
    /// A known id is a no-op. Otherwise the record is published on its topic
    /// first; if that fails the error is returned and nothing is stored, so
    /// the caller can retry. Once published it is accepted locally and
    /// replicated to the successor.
    pub async fn publish(&self, record: Record) -> Result<Acceptance, NodeError> {
        if record.topic != DELETION_TOPIC {
            check_topic(&record.topic)?;
        }
        if self.store.lock().contains(&record.id) {
            debug!(record = %record.id, "publish of known record ignored");
            return Ok(Acceptance::Duplicate);
        }

        let payload = Bytes::from(record.to_json()?);
        self.transport.publish(&record.topic, payload, false).await?;

        let acceptance = self.store.lock().accept(record.clone(), Ingest::Local);
        // Our own copy may already have come back through the topic. That
        // path replicates records but not tombstones.
        let replicate = acceptance.should_replicate()
            || (acceptance.is_duplicate() && record.is_tombstone());
        if replicate {
            self.replicate(&record).await;
        }
        Ok(acceptance)
    }

    /// Delete a record this node originated by publishing a tombstone.
    pub async fn delete(&self, target_id: &str) -> Result<Acceptance, NodeError> {
        let owner = origin_of(target_id);
        if owner != self.id().as_str() {
            return Err(NodeError::NotOwner {
                id: target_id.to_string(),
                owner: owner.to_string(),
                local: self.id().clone(),
            });
        }
        self.publish(Record::tombstone(self.id(), target_id)).await
    }

    /// Subscribe to an application topic. Returns false if already subscribed.
    pub async fn subscribe_topic(&self, topic: &str) -> Result<bool, NodeError> {
        check_topic(topic)?;
        if !self.topics.lock().insert(topic.to_string()) {
            return Ok(false);
        }
        if let Err(err) = self.transport.subscribe(topic).await {
            self.topics.lock().remove(topic);
            return Err(err.into());
        }
        info!(%topic, "subscribed");
        Ok(true)
    }

    /// Unsubscribe from an application topic. Returns false if not subscribed.
    pub async fn unsubscribe_topic(&self, topic: &str) -> Result<bool, NodeError> {
        if !self.topics.lock().remove(topic) {
            return Ok(false);
        }
        self.transport.unsubscribe(topic).await?;
        info!(%topic, "unsubscribed");
        Ok(true)
    }

    pub fn subscribed_topics(&self) -> Vec<String> {
        self.topics.lock().iter().cloned().collect()
    }

    /// Stored records on the topics this node is subscribed to.
    pub fn records_for_subscriptions(&self) -> Vec<Record> {
        let topics = self.subscribed_topics();
        self.store.lock().by_topics(&topics)
    }

    pub fn id(&self) -> &NodeId {
        &self.config.node_id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn view(&self) -> Option<RingView> {
        self.ring.lock().view().cloned()
    }

    pub fn members(&self) -> Vec<NodeId> {
        self.ring.lock().members()
    }

    pub fn ring(&self) -> &SharedRingState {
        &self.ring
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn detector(&self) -> &Arc<FailureDetector> {
        &self.detector
    }

    /// Snapshot of every stored record in acceptance order.
    pub fn records(&self) -> Vec<Record> {
        self.store.lock().records().to_vec()
    }
}

fn check_topic(topic: &str) -> Result<(), NodeError> {
    let reserved = topic.is_empty()
        || topic == HEARTBEAT_CHANNEL
        || topic == DELETION_TOPIC
        || topic.starts_with(DISCOVERY_CHANNEL)
        || topic.starts_with(REPLICATE_PREFIX)
        || topic.contains('#');
    if reserved {
        return Err(NodeError::ReservedTopic(topic.to_string()));
    }
    Ok(())
}

/// Running node: its background tasks and the node itself.
pub struct NodeHandle {
    node: Arc<Node>,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeHandle {
    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// Stop the detector and dispatch loops.
    pub fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        info!(node = %self.node.id(), "node stopped");
    }
}
