//! Logical ring of nodes.
//!
//! The topology module derives neighbours from a membership set; the state
//! module owns that set together with failure-detection bookkeeping.

pub mod state;
pub mod topology;

pub use state::{Ack, Direction, FailureCounters, RingChange, RingState, SharedRingState};
pub use topology::{recompute_ring, RingView};
