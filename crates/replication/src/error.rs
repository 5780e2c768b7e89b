use thiserror::Error;

/// Errors surfaced by the replication engine.
///
/// Delivery failures are not errors: they are retried and reported as
/// [`ReplicationOutcome::Exhausted`](crate::ReplicationOutcome::Exhausted).
#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error("failed to encode record {id}: {source}")]
    Encode {
        id: String,
        #[source]
        source: corelib::Error,
    },
}
