//! Two-sided heartbeat failure detector.
//!
//! Every node watches both ring neighbours. On each tick it broadcasts a
//! heartbeat request (when it has a successor other than itself), then
//! checks how long each neighbour has been silent. A neighbour silent for
//! longer than the timeout gets a miss counted against the role it holds:
//!
//! - at the warn threshold the miss is logged as a warning
//! - at the evict threshold a retained `leave:<neighbour>` is published on
//!   the neighbour's discovery slot, and after a short propagation delay the
//!   neighbour is dropped from the local ring
//!
//! Escalations are guarded per direction; one arriving while another is in
//! progress for the same direction is dropped.

use crate::config::NodeConfig;
use bytes::Bytes;
use corelib::ring::{Direction, SharedRingState};
use corelib::NodeId;
use metrics::counter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use transport::protocol::{discovery_slot, HEARTBEAT_CHANNEL};
use transport::{DiscoveryMessage, HeartbeatMessage, Transport};

/// Current instant on the runtime clock, so paused test time applies.
pub(crate) fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// Result of one escalation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Escalation {
    /// Nothing monitored in that direction.
    Skipped,
    /// Another escalation for the direction is running.
    Busy,
    /// Miss counted; the neighbour stays.
    Counted { node: NodeId, misses: u32 },
    /// The neighbour was removed from the ring.
    Evicted(NodeId),
}

pub struct FailureDetector {
    local: NodeId,
    ring: SharedRingState,
    transport: Arc<dyn Transport>,
    interval: Duration,
    timeout: Duration,
    idle_poll: Duration,
    warn_threshold: u32,
    evict_threshold: u32,
    leave_delay: Duration,
    successor_busy: AtomicBool,
    predecessor_busy: AtomicBool,
}

/// Clears an in-progress flag when the escalation ends, however it ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl FailureDetector {
    pub fn new(ring: SharedRingState, transport: Arc<dyn Transport>, config: &NodeConfig) -> Self {
        Self {
            local: config.node_id.clone(),
            ring,
            transport,
            interval: config.heartbeat_interval,
            timeout: config.heartbeat_timeout,
            idle_poll: config.idle_poll,
            warn_threshold: config.warn_threshold,
            evict_threshold: config.evict_threshold,
            leave_delay: config.leave_propagation_delay,
            successor_busy: AtomicBool::new(false),
            predecessor_busy: AtomicBool::new(false),
        }
    }

    /// Tick forever.
    pub async fn run(self: Arc<Self>) {
        loop {
            let pause = self.tick().await;
            tokio::time::sleep(pause).await;
        }
    }

    /// One detector round. Returns how long to wait before the next one.
    pub async fn tick(&self) -> Duration {
        let successor = {
            let ring = self.ring.lock();
            if ring.size() <= 1 {
                return self.idle_poll;
            }
            ring.monitored(Direction::Successor).cloned()
        };

        if let Some(successor) = successor {
            let request = HeartbeatMessage::request(&self.local).encode();
            match self
                .transport
                .publish(HEARTBEAT_CHANNEL, Bytes::from(request), false)
                .await
            {
                Ok(()) => debug!(%successor, "heartbeat request sent"),
                Err(err) => warn!(error = %err, "heartbeat request failed"),
            }
        }

        for direction in Direction::BOTH {
            let late = {
                let ring = self.ring.lock();
                ring.monitored(direction).is_some()
                    && ring.since_heartbeat(direction, now()) > self.timeout
            };
            if late {
                self.escalate(direction).await;
            }
        }
        self.interval
    }

    /// Apply a message from the heartbeat channel.
    ///
    /// Every request is answered, including our own; responses from the
    /// local node are ignored by the ring state.
    pub async fn handle_heartbeat(&self, message: HeartbeatMessage) {
        match message {
            HeartbeatMessage::Request(sender) => {
                let response = HeartbeatMessage::response(&self.local).encode();
                if let Err(err) = self
                    .transport
                    .publish(HEARTBEAT_CHANNEL, Bytes::from(response), false)
                    .await
                {
                    warn!(%sender, error = %err, "heartbeat response failed");
                }
            }
            HeartbeatMessage::Response(replier) => {
                let replier = match NodeId::parse(&replier) {
                    Ok(id) => id,
                    Err(err) => {
                        warn!(error = %err, "ignoring heartbeat response");
                        return;
                    }
                };
                let ack = self.ring.lock().acknowledge(&replier, now());
                if ack.any() {
                    debug!(%replier, successor = ack.successor, predecessor = ack.predecessor, "heartbeat acknowledged");
                }
            }
        }
    }

    /// Count a miss for the neighbour in `direction` and act on the total.
    pub async fn escalate(&self, direction: Direction) -> Escalation {
        let flag = match direction {
            Direction::Successor => &self.successor_busy,
            Direction::Predecessor => &self.predecessor_busy,
        };
        if flag.swap(true, Ordering::AcqRel) {
            debug!(%direction, "escalation already in progress");
            return Escalation::Busy;
        }
        let _guard = BusyGuard(flag);

        let missed = self.ring.lock().record_miss(direction);
        let Some((node, misses)) = missed else {
            return Escalation::Skipped;
        };
        counter!("ringnews_heartbeat_misses_total").increment(1);

        if misses < self.evict_threshold {
            if misses == self.warn_threshold {
                warn!(%node, %direction, misses, "neighbour missed heartbeats");
            } else {
                debug!(%node, %direction, misses, "heartbeat missed");
            }
            return Escalation::Counted { node, misses };
        }

        self.evict(direction, node).await
    }

    async fn evict(&self, direction: Direction, node: NodeId) -> Escalation {
        if !self.ring.lock().contains(&node) {
            return Escalation::Skipped;
        }

        warn!(%node, %direction, "neighbour considered failed, announcing leave");
        let leave = DiscoveryMessage::leave(&node).encode();
        if let Err(err) = self
            .transport
            .publish(&discovery_slot(&node), Bytes::from(leave), true)
            .await
        {
            error!(%node, error = %err, "failed to publish leave");
        }
        self.ring.lock().reset_direction(direction, &node);

        tokio::time::sleep(self.leave_delay).await;

        let mut ring = self.ring.lock();
        ring.remove_member(&node);
        match ring.recompute(now()) {
            Ok(change) => info!(%node, view = %change.current, "evicted failed neighbour"),
            Err(err) => warn!(%node, error = %err, "evicted neighbour, ring not recomputed"),
        }
        counter!("ringnews_nodes_evicted_total").increment(1);
        Escalation::Evicted(node)
    }
}
