//! Node configuration.

use corelib::NodeId;
use replication::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Everything a node needs besides its transport.
///
/// Defaults reproduce the production timings: heartbeat every 10 s, a
/// neighbour is late after 20 s of silence, warned about on its 3rd miss and
/// evicted on its 5th.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub node_id: NodeId,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    /// Poll interval while the node is alone in the ring.
    pub idle_poll: Duration,
    pub warn_threshold: u32,
    pub evict_threshold: u32,
    /// Pause between publishing a leave and applying it locally.
    pub leave_propagation_delay: Duration,
    pub replication_attempts: u32,
    pub replication_backoff: Duration,
    pub worker_pool_size: usize,
    /// Durable log; `None` keeps records in memory only.
    pub log_path: Option<PathBuf>,
    /// Application topics subscribed at start.
    pub topics: Vec<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: NodeId::from_index(1),
            heartbeat_interval: Duration::from_secs(10),
            heartbeat_timeout: Duration::from_secs(20),
            idle_poll: Duration::from_secs(15),
            warn_threshold: 3,
            evict_threshold: 5,
            leave_propagation_delay: Duration::from_secs(2),
            replication_attempts: 3,
            replication_backoff: Duration::from_secs(1),
            worker_pool_size: 10,
            log_path: None,
            topics: Vec::new(),
        }
    }
}

impl NodeConfig {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            ..Self::default()
        }
    }

    pub fn with_heartbeat(mut self, interval: Duration, timeout: Duration) -> Self {
        self.heartbeat_interval = interval;
        self.heartbeat_timeout = timeout;
        self
    }

    pub fn with_idle_poll(mut self, idle_poll: Duration) -> Self {
        self.idle_poll = idle_poll;
        self
    }

    pub fn with_thresholds(mut self, warn: u32, evict: u32) -> Self {
        self.warn_threshold = warn;
        self.evict_threshold = evict;
        self
    }

    pub fn with_leave_propagation_delay(mut self, delay: Duration) -> Self {
        self.leave_propagation_delay = delay;
        self
    }

    pub fn with_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.replication_attempts = attempts;
        self.replication_backoff = backoff;
        self
    }

    pub fn with_worker_pool_size(mut self, size: usize) -> Self {
        self.worker_pool_size = size;
        self
    }

    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    pub fn with_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics = topics.into_iter().map(Into::into).collect();
        self
    }

    /// Rescale every timing so that one second of the defaults becomes
    /// `unit`. Thresholds and sizes are unchanged.
    pub fn scaled(mut self, unit: Duration) -> Self {
        self.heartbeat_interval = unit * 10;
        self.heartbeat_timeout = unit * 20;
        self.idle_poll = unit * 15;
        self.leave_propagation_delay = unit * 2;
        self.replication_backoff = unit;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.replication_attempts, self.replication_backoff)
    }
}
