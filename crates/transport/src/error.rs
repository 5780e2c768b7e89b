//! Transport and protocol errors.

use thiserror::Error;

/// Failures of the publish/subscribe transport itself.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The client is not connected to the broker.
    #[error("client {0} is disconnected")]
    Disconnected(String),
    /// The broker refused the operation.
    #[error("publish to {topic} rejected: {reason}")]
    Rejected { topic: String, reason: String },
}

/// Malformed inbound payloads.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("payload on {0} is not valid UTF-8")]
    NotUtf8(String),
    #[error("unrecognised heartbeat payload: {0:?}")]
    Heartbeat(String),
    #[error("unrecognised discovery payload: {0:?}")]
    Discovery(String),
    #[error("malformed record on {topic}: {source}")]
    Record {
        topic: String,
        #[source]
        source: corelib::Error,
    },
}
