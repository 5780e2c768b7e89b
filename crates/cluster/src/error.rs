use corelib::NodeId;
use thiserror::Error;
use transport::TransportError;

/// Errors returned by node operations.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Core(#[from] corelib::Error),

    #[error(transparent)]
    Replication(#[from] replication::ReplicationError),

    /// Only the originating node may delete a record.
    #[error("record {id} belongs to {owner:?}, not {local}")]
    NotOwner {
        id: String,
        owner: String,
        local: NodeId,
    },

    /// Control and replication channels cannot be used as application topics.
    #[error("topic {0:?} is reserved")]
    ReservedTopic(String),
}
