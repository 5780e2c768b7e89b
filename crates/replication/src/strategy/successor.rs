//! Successor replication strategy.
//!
//! Places one backup copy on the next node clockwise. This matches a ring
//! where every node is the backup of its predecessor:
//!
//! - A record published on N2 is copied to N3
//! - The last node's copies wrap around to the first
//! - A solo node has nobody to copy to
//!
//! # Limitations
//!
//! - A single backup: losing a node and its successor together loses data
//! - Copies are not moved when the successor changes

use crate::strategy::ReplicationStrategy;
use corelib::node::NodeId;
use corelib::ring::RingView;

/// One replica on the immediate successor.
///
/// # Example
///
/// ```rust
/// use corelib::{recompute_ring, NodeId};
/// use replication::{ReplicationStrategy, SuccessorStrategy};
///
/// let ids = [NodeId::from_index(1), NodeId::from_index(2), NodeId::from_index(3)];
/// let view = recompute_ring(&ids, &ids[1]).unwrap();
///
/// let targets = SuccessorStrategy.targets(&view, &ids[1]);
/// assert_eq!(targets, vec![NodeId::from_index(3)]);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SuccessorStrategy;

impl ReplicationStrategy for SuccessorStrategy {
    fn targets(&self, view: &RingView, local: &NodeId) -> Vec<NodeId> {
        if view.is_solo() || &view.successor == local {
            return Vec::new();
        }
        vec![view.successor.clone()]
    }

    fn name(&self) -> &'static str {
        "SuccessorStrategy"
    }
}
