//! Transport contract and an in-process broker implementing it.
//!
//! The broker follows MQTT semantics where nodes depend on them: fan-out to
//! every matching subscriber (the publisher included), one retained payload
//! per exact topic delivered on subscribe, and a trailing `#` wildcard. It
//! can also drop a client (a crashed node) and fail a client's next
//! publishes, which is what the failure-path tests need.

use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// One inbound message handed to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub payload: Bytes,
}

/// What the ring core needs from a publish/subscribe transport.
///
/// Deliveries are not part of the trait: each implementation hands out a
/// receiving channel when the client connects.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Identity of this client on the transport.
    fn client_id(&self) -> &str;

    async fn publish(&self, topic: &str, payload: Bytes, retained: bool)
        -> Result<(), TransportError>;

    async fn subscribe(&self, topic: &str) -> Result<(), TransportError>;

    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError>;
}

struct Session {
    sender: mpsc::UnboundedSender<Delivery>,
    filters: HashSet<String>,
}

#[derive(Default)]
struct Inner {
    sessions: DashMap<String, Session>,
    retained: DashMap<String, Bytes>,
    failures: DashMap<String, u32>,
}

/// In-process publish/subscribe hub.
#[derive(Clone, Default)]
pub struct Broker {
    inner: Arc<Inner>,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect `client_id` with a clean session, replacing any previous one.
    pub fn connect(
        &self,
        client_id: impl Into<String>,
    ) -> (BrokerClient, mpsc::UnboundedReceiver<Delivery>) {
        let id = client_id.into();
        let (sender, receiver) = mpsc::unbounded_channel();
        self.inner.sessions.insert(
            id.clone(),
            Session {
                sender,
                filters: HashSet::new(),
            },
        );
        debug!(client = %id, "client connected");
        let client = BrokerClient {
            id,
            broker: self.clone(),
        };
        (client, receiver)
    }

    /// Drop a client's session. Its publishes fail and nothing more is
    /// delivered to it. Returns false if it was not connected.
    pub fn disconnect(&self, client_id: &str) -> bool {
        let removed = self.inner.sessions.remove(client_id).is_some();
        if removed {
            debug!(client = %client_id, "client disconnected");
        }
        removed
    }

    pub fn is_connected(&self, client_id: &str) -> bool {
        self.inner.sessions.contains_key(client_id)
    }

    /// Make the next `count` publishes from `client_id` fail.
    pub fn fail_next_publishes(&self, client_id: &str, count: u32) {
        self.inner.failures.insert(client_id.to_string(), count);
    }

    /// Current retained payload on an exact topic.
    pub fn retained(&self, topic: &str) -> Option<Bytes> {
        self.inner.retained.get(topic).map(|p| p.value().clone())
    }

    fn take_failure(&self, client_id: &str) -> bool {
        match self.inner.failures.get_mut(client_id) {
            Some(mut left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        }
    }

    fn publish_from(
        &self,
        from: &str,
        topic: &str,
        payload: Bytes,
        retained: bool,
    ) -> Result<(), TransportError> {
        if !self.is_connected(from) {
            return Err(TransportError::Disconnected(from.to_string()));
        }
        if self.take_failure(from) {
            return Err(TransportError::Rejected {
                topic: topic.to_string(),
                reason: "injected failure".to_string(),
            });
        }

        if retained {
            if payload.is_empty() {
                self.inner.retained.remove(topic);
            } else {
                self.inner.retained.insert(topic.to_string(), payload.clone());
            }
        }

        let mut delivered = 0usize;
        for session in self.inner.sessions.iter() {
            if session.filters.iter().any(|f| topic_matches(f, topic)) {
                let delivery = Delivery {
                    topic: topic.to_string(),
                    payload: payload.clone(),
                };
                // A closed receiver means the node is gone; drop silently.
                if session.sender.send(delivery).is_ok() {
                    delivered += 1;
                }
            }
        }
        debug!(from = %from, topic = %topic, retained, delivered, "published");
        Ok(())
    }

    fn subscribe_client(&self, client_id: &str, filter: &str) -> Result<(), TransportError> {
        let sender = {
            let mut session = self
                .inner
                .sessions
                .get_mut(client_id)
                .ok_or_else(|| TransportError::Disconnected(client_id.to_string()))?;
            session.filters.insert(filter.to_string());
            session.sender.clone()
        };

        let retained: Vec<Delivery> = self
            .inner
            .retained
            .iter()
            .filter(|entry| topic_matches(filter, entry.key()))
            .map(|entry| Delivery {
                topic: entry.key().clone(),
                payload: entry.value().clone(),
            })
            .collect();
        for delivery in retained {
            let _ = sender.send(delivery);
        }
        debug!(client = %client_id, filter = %filter, "subscribed");
        Ok(())
    }

    fn unsubscribe_client(&self, client_id: &str, filter: &str) -> Result<(), TransportError> {
        let mut session = self
            .inner
            .sessions
            .get_mut(client_id)
            .ok_or_else(|| TransportError::Disconnected(client_id.to_string()))?;
        session.filters.remove(filter);
        Ok(())
    }
}

/// Whether subscription `filter` covers `topic`.
///
/// Supports exact topics, `#` alone, and a trailing `/#` that matches the
/// parent level and everything below it.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    if filter == "#" {
        return true;
    }
    match filter.strip_suffix("/#") {
        Some(parent) => {
            topic == parent
                || topic
                    .strip_prefix(parent)
                    .map_or(false, |rest| rest.starts_with('/'))
        }
        None => filter == topic,
    }
}

/// A node's connection to a [`Broker`].
#[derive(Clone)]
pub struct BrokerClient {
    id: String,
    broker: Broker,
}

impl BrokerClient {
    pub fn broker(&self) -> &Broker {
        &self.broker
    }
}

#[async_trait]
impl Transport for BrokerClient {
    fn client_id(&self) -> &str {
        &self.id
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        retained: bool,
    ) -> Result<(), TransportError> {
        self.broker.publish_from(&self.id, topic, payload, retained)
    }

    async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.broker.subscribe_client(&self.id, topic)
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.broker.unsubscribe_client(&self.id, topic)
    }
}
