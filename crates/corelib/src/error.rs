//! Error types for the core library.

use crate::node::NodeId;
use thiserror::Error;

/// Result type alias for the core library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the core library.
#[derive(Debug, Error)]
pub enum Error {
    /// The local node is not part of the active set, so it has no ring position.
    #[error("node {0} is not in the ring")]
    NotInRing(NodeId),
    /// A node id that does not match `N<digits>`.
    #[error("invalid node id: {0:?}")]
    InvalidNodeId(String),
    /// A record payload that could not be encoded or decoded.
    #[error("record codec error: {0}")]
    Codec(#[from] serde_json::Error),
    /// Durable log I/O failure.
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
}
