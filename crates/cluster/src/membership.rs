//! Join/leave membership protocol.
//!
//! Each node owns one retained discovery slot, `ring_discovery/<id>`, and
//! announces `join:<id>` there on start. Evictions overwrite the evicted
//! node's slot with `leave:<id>`. Nodes subscribe to `ring_discovery/#`, so
//! a late joiner receives the latest announcement of every node.

use crate::detector::now;
use crate::error::NodeError;
use bytes::Bytes;
use corelib::ring::SharedRingState;
use corelib::NodeId;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use transport::protocol::discovery_slot;
use transport::{DiscoveryMessage, Transport};

pub struct Membership {
    local: NodeId,
    ring: SharedRingState,
    transport: Arc<dyn Transport>,
}

impl Membership {
    pub fn new(local: NodeId, ring: SharedRingState, transport: Arc<dyn Transport>) -> Self {
        Self {
            local,
            ring,
            transport,
        }
    }

    /// Publish `join:<self>` on our slot, then take our place in the ring.
    pub async fn announce(&self) -> Result<(), NodeError> {
        let join = DiscoveryMessage::join(&self.local).encode();
        self.transport
            .publish(&discovery_slot(&self.local), Bytes::from(join), true)
            .await?;

        let mut ring = self.ring.lock();
        ring.add_member(self.local.clone());
        let change = ring.recompute(now())?;
        info!(view = %change.current, "announced presence");
        Ok(())
    }

    /// Apply an announcement read from a discovery slot.
    pub async fn handle(&self, message: DiscoveryMessage) {
        match message {
            DiscoveryMessage::Join(raw) => self.on_join(&raw),
            DiscoveryMessage::Leave(raw) => {
                let node = match NodeId::parse(&raw) {
                    Ok(node) => node,
                    Err(err) => {
                        warn!(error = %err, "ignoring leave");
                        return;
                    }
                };
                if node == self.local {
                    self.refute_eviction().await;
                } else {
                    self.on_leave(&node);
                }
            }
        }
    }

    fn on_join(&self, raw: &str) {
        if raw == self.local.as_str() {
            return;
        }
        let node = match NodeId::parse(raw) {
            Ok(node) => node,
            Err(err) => {
                warn!(error = %err, "ignoring join");
                return;
            }
        };

        let mut ring = self.ring.lock();
        let added = ring.add_member(node.clone());
        ring.reset_failures(&node);
        match ring.recompute(now()) {
            Ok(change) => info!(%node, added, view = %change.current, "node joined"),
            Err(err) => debug!(%node, error = %err, "node joined before local announce"),
        }
    }

    fn on_leave(&self, node: &NodeId) {
        let mut ring = self.ring.lock();
        if !ring.remove_member(node) {
            debug!(%node, "leave for unknown node");
        }
        match ring.recompute(now()) {
            Ok(change) if change.is_noop() => debug!(%node, "leave applied"),
            Ok(change) => info!(%node, view = %change.current, "node left"),
            Err(err) => debug!(%node, error = %err, "leave applied before local announce"),
        }
    }

    /// A peer declared us failed. Drop ourselves as told, then rejoin.
    async fn refute_eviction(&self) {
        warn!("evicted by a peer, announcing again");
        {
            let mut ring = self.ring.lock();
            ring.remove_member(&self.local);
            let _ = ring.recompute(now());
        }
        if let Err(err) = self.announce().await {
            error!(error = %err, "failed to re-announce after eviction");
        }
    }
}
