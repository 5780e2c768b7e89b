//! Replication of accepted records to ring neighbours.
//!
//! This crate provides:
//! - Pluggable strategies choosing which neighbours receive a backup copy
//! - The replication engine that pushes copies with a bounded retry budget

pub mod engine;
pub mod error;
pub mod strategy;

pub use engine::{ReplicationEngine, ReplicationOutcome, RetryPolicy};
pub use error::ReplicationError;
pub use strategy::{ReplicationStrategy, SuccessorStrategy};
