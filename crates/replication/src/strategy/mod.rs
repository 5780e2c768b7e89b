//! Replication strategy abstractions.
//!
//! A strategy decides which nodes receive a backup copy of a record accepted
//! locally, given the current ring view:
//!
//! - **SuccessorStrategy**: one copy on the immediate successor

pub mod successor;

pub use successor::SuccessorStrategy;

use corelib::node::NodeId;
use corelib::ring::RingView;

/// Trait for replication strategies.
///
/// # Thread Safety
///
/// Implementations must be thread-safe (Send + Sync) as they are shared by
/// every message worker of a node.
pub trait ReplicationStrategy: Send + Sync + 'static {
    /// Nodes that should receive a copy, in delivery order.
    ///
    /// # Arguments
    /// * `view` - The local node's current ring view
    /// * `local` - The local node, which never receives its own copy
    ///
    /// # Returns
    /// Target nodes; empty when there is nobody to replicate to
    fn targets(&self, view: &RingView, local: &NodeId) -> Vec<NodeId>;

    /// Get the strategy name (for logging/debugging).
    fn name(&self) -> &'static str;
}
