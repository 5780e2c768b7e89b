//! Ring topology: predecessor and successor from the active node set.
//!
//! Nodes are placed on the ring by their numeric id. The view is a pure
//! function of the active set and the local id, so recomputing it with the
//! same input always yields the same neighbours.

use crate::error::{Error, Result};
use crate::node::NodeId;
use std::fmt;

/// The local node's neighbours on the ring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingView {
    pub predecessor: NodeId,
    pub successor: NodeId,
    /// Number of distinct active nodes the view was computed from.
    pub size: usize,
}

impl RingView {
    /// True when the local node is alone (both neighbours are itself).
    pub fn is_solo(&self) -> bool {
        self.size <= 1
    }
}

impl fmt::Display for RingView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pred={} succ={} size={}",
            self.predecessor, self.successor, self.size
        )
    }
}

/// Compute the local node's predecessor and successor.
///
/// # Errors
///
/// `Error::NotInRing` when `local` is not among `active`; the caller should
/// keep its previous view in that case.
///
/// # Example
///
/// ```rust
/// use corelib::node::NodeId;
/// use corelib::ring::recompute_ring;
///
/// let active = [1, 2, 3].map(NodeId::from_index);
/// let view = recompute_ring(&active, &NodeId::from_index(3)).unwrap();
/// assert_eq!(view.successor, NodeId::from_index(1));
/// assert_eq!(view.predecessor, NodeId::from_index(2));
/// ```
pub fn recompute_ring<'a, I>(active: I, local: &NodeId) -> Result<RingView>
where
    I: IntoIterator<Item = &'a NodeId>,
{
    let mut sorted: Vec<&NodeId> = active.into_iter().collect();
    sorted.sort();
    sorted.dedup();

    let index = sorted
        .binary_search(&local)
        .map_err(|_| Error::NotInRing(local.clone()))?;

    let n = sorted.len();
    Ok(RingView {
        predecessor: sorted[(index + n - 1) % n].clone(),
        successor: sorted[(index + 1) % n].clone(),
        size: n,
    })
}
