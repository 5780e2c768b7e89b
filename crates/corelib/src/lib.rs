//! Core library for the news ring.
//!
//! This crate provides the data model and the synchronous building
//! blocks every node is made of:
//! - Node identities and their ring ordering
//! - Records and deletion tombstones
//! - Ring topology and the shared ring state (membership, failure counters)
//! - The deduplicated record store and its durable log

pub mod error;
pub mod node;
pub mod record;
pub mod ring;
pub mod store;

pub use error::{Error, Result};
pub use node::NodeId;
pub use record::{Record, DELETION_TOPIC};
pub use ring::{recompute_ring, Direction, RingState, RingView, SharedRingState};
pub use store::{Acceptance, Ingest, RecordLog, RecordStore, SharedStore};
