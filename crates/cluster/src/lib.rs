//! Node runtime for the news ring.
//!
//! This crate wires the pieces of a node together:
//! - Configuration with the timing and threshold defaults
//! - The two-sided heartbeat failure detector
//! - The join/leave membership protocol
//! - The node controller: subscriptions, message dispatch, publish/delete

pub mod config;
pub mod detector;
pub mod error;
pub mod membership;
pub mod node;

pub use config::NodeConfig;
pub use detector::{Escalation, FailureDetector};
pub use error::NodeError;
pub use membership::Membership;
pub use node::{Node, NodeHandle};
