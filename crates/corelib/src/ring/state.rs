//! Mutable ring membership state.
//!
//! `RingState` owns everything the failure detector, the membership protocol
//! and the replication engine share: the active node set, the current ring
//! view, the per-direction failure counters and the last time each neighbour
//! answered a heartbeat. It is meant to live behind a single lock
//! ([`SharedRingState`]); none of its methods block or sleep.

use crate::error::Result;
use crate::node::NodeId;
use crate::ring::topology::{recompute_ring, RingView};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Ring state shared between the detector loop and message workers.
pub type SharedRingState = Arc<Mutex<RingState>>;

/// Which neighbour a heartbeat or failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Successor,
    Predecessor,
}

impl Direction {
    pub const BOTH: [Direction; 2] = [Direction::Successor, Direction::Predecessor];
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Successor => f.write_str("successor"),
            Direction::Predecessor => f.write_str("predecessor"),
        }
    }
}

/// Missed-heartbeat counts, kept separately per ring role.
///
/// In small rings one node can be both successor and predecessor, so the two
/// roles are counted independently.
#[derive(Debug, Default, Clone)]
pub struct FailureCounters {
    successor: HashMap<NodeId, u32>,
    predecessor: HashMap<NodeId, u32>,
}

impl FailureCounters {
    fn map(&self, direction: Direction) -> &HashMap<NodeId, u32> {
        match direction {
            Direction::Successor => &self.successor,
            Direction::Predecessor => &self.predecessor,
        }
    }

    fn map_mut(&mut self, direction: Direction) -> &mut HashMap<NodeId, u32> {
        match direction {
            Direction::Successor => &mut self.successor,
            Direction::Predecessor => &mut self.predecessor,
        }
    }

    pub fn get(&self, direction: Direction, node: &NodeId) -> u32 {
        self.map(direction).get(node).copied().unwrap_or(0)
    }

    /// Count one more miss and return the new total.
    pub fn increment(&mut self, direction: Direction, node: &NodeId) -> u32 {
        let count = self.map_mut(direction).entry(node.clone()).or_insert(0);
        *count += 1;
        *count
    }

    /// Zero the count for one role.
    pub fn reset_direction(&mut self, direction: Direction, node: &NodeId) {
        self.map_mut(direction).insert(node.clone(), 0);
    }

    /// Zero both roles for `node`.
    pub fn reset(&mut self, node: &NodeId) {
        self.reset_direction(Direction::Successor, node);
        self.reset_direction(Direction::Predecessor, node);
    }

    /// Drop every entry for `node`.
    pub fn forget(&mut self, node: &NodeId) {
        self.successor.remove(node);
        self.predecessor.remove(node);
    }
}

/// Outcome of a recomputation: the view before and after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingChange {
    pub previous: Option<RingView>,
    pub current: RingView,
}

impl RingChange {
    pub fn successor_changed(&self) -> bool {
        self.previous.as_ref().map(|v| &v.successor) != Some(&self.current.successor)
    }

    pub fn predecessor_changed(&self) -> bool {
        self.previous.as_ref().map(|v| &v.predecessor) != Some(&self.current.predecessor)
    }

    pub fn is_noop(&self) -> bool {
        !self.successor_changed() && !self.predecessor_changed()
    }
}

/// Which roles a heartbeat response refreshed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ack {
    pub successor: bool,
    pub predecessor: bool,
}

impl Ack {
    pub fn any(&self) -> bool {
        self.successor || self.predecessor
    }
}

/// Membership set, ring view, failure counters and heartbeat clocks.
#[derive(Debug, Clone)]
pub struct RingState {
    local: NodeId,
    active: BTreeSet<NodeId>,
    view: Option<RingView>,
    counters: FailureCounters,
    last_successor_heartbeat: Instant,
    last_predecessor_heartbeat: Instant,
}

impl RingState {
    /// Empty state for `local`; the local node joins once it announces itself.
    pub fn new(local: NodeId, now: Instant) -> Self {
        Self {
            local,
            active: BTreeSet::new(),
            view: None,
            counters: FailureCounters::default(),
            last_successor_heartbeat: now,
            last_predecessor_heartbeat: now,
        }
    }

    /// Convenience for wrapping a fresh state in the shared lock.
    pub fn shared(local: NodeId, now: Instant) -> SharedRingState {
        Arc::new(Mutex::new(Self::new(local, now)))
    }

    pub fn local(&self) -> &NodeId {
        &self.local
    }

    /// Active members in ring order.
    pub fn members(&self) -> Vec<NodeId> {
        self.active.iter().cloned().collect()
    }

    pub fn size(&self) -> usize {
        self.active.len()
    }

    pub fn contains(&self, node: &NodeId) -> bool {
        self.active.contains(node)
    }

    pub fn view(&self) -> Option<&RingView> {
        self.view.as_ref()
    }

    pub fn successor(&self) -> Option<&NodeId> {
        self.view.as_ref().map(|v| &v.successor)
    }

    pub fn predecessor(&self) -> Option<&NodeId> {
        self.view.as_ref().map(|v| &v.predecessor)
    }

    pub fn neighbour(&self, direction: Direction) -> Option<&NodeId> {
        match direction {
            Direction::Successor => self.successor(),
            Direction::Predecessor => self.predecessor(),
        }
    }

    pub fn counters(&self) -> &FailureCounters {
        &self.counters
    }

    pub fn failures(&self, direction: Direction, node: &NodeId) -> u32 {
        self.counters.get(direction, node)
    }

    /// Add a member. Returns false if it was already active.
    pub fn add_member(&mut self, node: NodeId) -> bool {
        self.active.insert(node)
    }

    /// Remove a member and its counters. Returns false if it was absent.
    pub fn remove_member(&mut self, node: &NodeId) -> bool {
        self.counters.forget(node);
        self.active.remove(node)
    }

    pub fn reset_failures(&mut self, node: &NodeId) {
        self.counters.reset(node);
    }

    pub fn reset_direction(&mut self, direction: Direction, node: &NodeId) {
        self.counters.reset_direction(direction, node);
    }

    /// Recompute the view from the active set.
    ///
    /// A neighbour that takes a new role gets its counters zeroed and its
    /// heartbeat clock restarted at `now`, so it is not flagged on the next
    /// check because of the previous neighbour's silence.
    pub fn recompute(&mut self, now: Instant) -> Result<RingChange> {
        let current = recompute_ring(&self.active, &self.local)?;
        let change = RingChange {
            previous: self.view.replace(current.clone()),
            current,
        };

        if change.successor_changed() {
            info!(
                node = %self.local,
                from = ?change.previous.as_ref().map(|v| v.successor.to_string()),
                to = %change.current.successor,
                "successor changed"
            );
            self.counters.reset(&change.current.successor);
            self.last_successor_heartbeat = now;
        }
        if change.predecessor_changed() {
            info!(
                node = %self.local,
                from = ?change.previous.as_ref().map(|v| v.predecessor.to_string()),
                to = %change.current.predecessor,
                "predecessor changed"
            );
            self.counters.reset(&change.current.predecessor);
            self.last_predecessor_heartbeat = now;
        }
        Ok(change)
    }

    /// Apply a heartbeat response from `from`.
    ///
    /// Responses from the local node are ignored. When one node holds both
    /// roles (two-node ring) a single response refreshes both.
    pub fn acknowledge(&mut self, from: &NodeId, now: Instant) -> Ack {
        let mut ack = Ack::default();
        if from == &self.local {
            return ack;
        }
        if self.successor() == Some(from) {
            self.counters.reset(from);
            self.last_successor_heartbeat = now;
            ack.successor = true;
        }
        if self.predecessor() == Some(from) {
            self.counters.reset(from);
            self.last_predecessor_heartbeat = now;
            ack.predecessor = true;
        }
        ack
    }

    /// Time since the neighbour in `direction` last answered.
    pub fn since_heartbeat(&self, direction: Direction, now: Instant) -> Duration {
        let last = match direction {
            Direction::Successor => self.last_successor_heartbeat,
            Direction::Predecessor => self.last_predecessor_heartbeat,
        };
        now.saturating_duration_since(last)
    }

    /// The neighbour in `direction` if it is worth monitoring: the ring has
    /// more than one member and the neighbour is not the local node.
    pub fn monitored(&self, direction: Direction) -> Option<&NodeId> {
        if self.size() <= 1 {
            return None;
        }
        self.neighbour(direction).filter(|n| *n != &self.local)
    }

    /// Count a missed heartbeat for the monitored neighbour in `direction`.
    ///
    /// Returns the neighbour and its new miss count, or `None` when nothing
    /// is monitored in that direction.
    pub fn record_miss(&mut self, direction: Direction) -> Option<(NodeId, u32)> {
        let neighbour = self.monitored(direction)?.clone();
        let count = self.counters.increment(direction, &neighbour);
        Some((neighbour, count))
    }
}
