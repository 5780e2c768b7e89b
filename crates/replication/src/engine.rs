//! Replication engine.
//!
//! Pushes a JSON copy of a locally accepted record to each strategy target
//! on `replicate/<target>`. Delivery is best-effort: a fixed number of
//! attempts with a fixed pause between them, after which the copy is given
//! up on. The local accept is never rolled back.

use crate::error::ReplicationError;
use crate::strategy::{ReplicationStrategy, SuccessorStrategy};
use bytes::Bytes;
use corelib::node::NodeId;
use corelib::record::Record;
use corelib::ring::RingView;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};
use transport::protocol::replicate_channel;
use transport::Transport;

/// Fixed attempt budget with a fixed pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    /// At least one attempt is always made.
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// What happened to one target's copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationOutcome {
    Delivered { target: NodeId, attempts: u32 },
    Exhausted { target: NodeId },
}

impl ReplicationOutcome {
    pub fn target(&self) -> &NodeId {
        match self {
            ReplicationOutcome::Delivered { target, .. }
            | ReplicationOutcome::Exhausted { target } => target,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, ReplicationOutcome::Delivered { .. })
    }
}

/// Sends backup copies through a transport.
#[derive(Clone)]
pub struct ReplicationEngine {
    local: NodeId,
    transport: Arc<dyn Transport>,
    strategy: Arc<dyn ReplicationStrategy>,
    policy: RetryPolicy,
}

impl ReplicationEngine {
    /// Engine using [`SuccessorStrategy`].
    pub fn new(local: NodeId, transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self::with_strategy(local, transport, Arc::new(SuccessorStrategy), policy)
    }

    pub fn with_strategy(
        local: NodeId,
        transport: Arc<dyn Transport>,
        strategy: Arc<dyn ReplicationStrategy>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            local,
            transport,
            strategy,
            policy,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Replicate `record` to the targets chosen from `view`.
    ///
    /// `view` is a snapshot taken by the caller; no ring lock is held while
    /// this awaits. A missing view (the node has not joined yet) or a solo
    /// ring yields no outcomes.
    ///
    /// # Errors
    ///
    /// Only if the record cannot be encoded. Failed deliveries come back as
    /// [`ReplicationOutcome::Exhausted`].
    pub async fn replicate(
        &self,
        record: &Record,
        view: Option<&RingView>,
    ) -> Result<Vec<ReplicationOutcome>, ReplicationError> {
        let targets = match view {
            Some(view) => self.strategy.targets(view, &self.local),
            None => Vec::new(),
        };
        if targets.is_empty() {
            debug!(record = %record.id, "no replication target");
            return Ok(Vec::new());
        }

        let payload = Bytes::from(record.to_json().map_err(|source| {
            ReplicationError::Encode {
                id: record.id.clone(),
                source,
            }
        })?);

        let mut outcomes = Vec::with_capacity(targets.len());
        for target in targets {
            outcomes.push(self.send(record, target, payload.clone()).await);
        }
        Ok(outcomes)
    }

    async fn send(&self, record: &Record, target: NodeId, payload: Bytes) -> ReplicationOutcome {
        let channel = replicate_channel(&target);

        for attempt in 1..=self.policy.attempts {
            counter!("ringnews_replication_attempts_total").increment(1);
            match self.transport.publish(&channel, payload.clone(), false).await {
                Ok(()) => {
                    debug!(record = %record.id, %target, attempt, "replicated");
                    return ReplicationOutcome::Delivered {
                        target,
                        attempts: attempt,
                    };
                }
                Err(err) => {
                    warn!(record = %record.id, %target, attempt, error = %err, "replication attempt failed");
                    if attempt < self.policy.attempts {
                        tokio::time::sleep(self.policy.backoff).await;
                    }
                }
            }
        }

        counter!("ringnews_replication_exhausted_total").increment(1);
        error!(
            record = %record.id,
            %target,
            attempts = self.policy.attempts,
            "replication gave up"
        );
        ReplicationOutcome::Exhausted { target }
    }
}
