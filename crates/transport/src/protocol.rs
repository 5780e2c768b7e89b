//! Control-channel protocol and inbound message classification.
//!
//! Control payloads are plain text:
//!
//! | Channel                  | Payload                      |
//! |--------------------------|------------------------------|
//! | `ring_heartbeat`         | `heartbeat_request:<id>`     |
//! | `ring_heartbeat`         | `heartbeat_response:<id>`    |
//! | `ring_discovery/<id>`    | `join:<id>` / `leave:<id>`   |
//! | `replicate/<successor>`  | JSON record                  |
//! | any other topic          | JSON record                  |
//!
//! Every delivery is classified once, here, into an [`Inbound`] variant.

use crate::error::ProtocolError;
use corelib::node::NodeId;
use corelib::record::Record;
use std::fmt;

/// Shared channel for heartbeat requests and responses.
pub const HEARTBEAT_CHANNEL: &str = "ring_heartbeat";

/// Root of the discovery channels. Each node announces on its own
/// retained slot below it.
pub const DISCOVERY_CHANNEL: &str = "ring_discovery";

/// Subscription covering every node's discovery slot.
pub const DISCOVERY_WILDCARD: &str = "ring_discovery/#";

/// Prefix of the per-successor replication channels.
pub const REPLICATE_PREFIX: &str = "replicate/";

const HEARTBEAT_REQUEST: &str = "heartbeat_request";
const HEARTBEAT_RESPONSE: &str = "heartbeat_response";
const JOIN: &str = "join";
const LEAVE: &str = "leave";

/// Retained discovery slot owned by `node`.
pub fn discovery_slot(node: &NodeId) -> String {
    format!("{}/{}", DISCOVERY_CHANNEL, node)
}

/// Channel a node's predecessor pushes backup copies to.
pub fn replicate_channel(node: &NodeId) -> String {
    format!("{}{}", REPLICATE_PREFIX, node)
}

fn split_control(payload: &str) -> Option<(&str, &str)> {
    let (kind, id) = payload.trim().split_once(':')?;
    (!id.is_empty()).then_some((kind, id))
}

/// Heartbeat exchange on [`HEARTBEAT_CHANNEL`].
///
/// Ids are carried unvalidated; receivers compare them to known ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatMessage {
    /// `heartbeat_request:<sender>`
    Request(String),
    /// `heartbeat_response:<replier>`
    Response(String),
}

impl HeartbeatMessage {
    pub fn request(sender: &NodeId) -> Self {
        HeartbeatMessage::Request(sender.to_string())
    }

    pub fn response(replier: &NodeId) -> Self {
        HeartbeatMessage::Response(replier.to_string())
    }

    pub fn parse(payload: &str) -> Result<Self, ProtocolError> {
        match split_control(payload) {
            Some((HEARTBEAT_REQUEST, id)) => Ok(HeartbeatMessage::Request(id.to_string())),
            Some((HEARTBEAT_RESPONSE, id)) => Ok(HeartbeatMessage::Response(id.to_string())),
            _ => Err(ProtocolError::Heartbeat(payload.to_string())),
        }
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for HeartbeatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeartbeatMessage::Request(id) => write!(f, "{}:{}", HEARTBEAT_REQUEST, id),
            HeartbeatMessage::Response(id) => write!(f, "{}:{}", HEARTBEAT_RESPONSE, id),
        }
    }
}

/// Membership announcement on a discovery slot.
///
/// Ids are validated by the membership protocol, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryMessage {
    /// `join:<id>`
    Join(String),
    /// `leave:<id>`
    Leave(String),
}

impl DiscoveryMessage {
    pub fn join(node: &NodeId) -> Self {
        DiscoveryMessage::Join(node.to_string())
    }

    pub fn leave(node: &NodeId) -> Self {
        DiscoveryMessage::Leave(node.to_string())
    }

    /// The id the announcement is about.
    pub fn subject(&self) -> &str {
        match self {
            DiscoveryMessage::Join(id) | DiscoveryMessage::Leave(id) => id,
        }
    }

    pub fn parse(payload: &str) -> Result<Self, ProtocolError> {
        match split_control(payload) {
            Some((JOIN, id)) => Ok(DiscoveryMessage::Join(id.to_string())),
            Some((LEAVE, id)) => Ok(DiscoveryMessage::Leave(id.to_string())),
            _ => Err(ProtocolError::Discovery(payload.to_string())),
        }
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DiscoveryMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryMessage::Join(id) => write!(f, "{}:{}", JOIN, id),
            DiscoveryMessage::Leave(id) => write!(f, "{}:{}", LEAVE, id),
        }
    }
}

/// A classified inbound delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Heartbeat(HeartbeatMessage),
    Discovery(DiscoveryMessage),
    /// Backup copy pushed to us by our predecessor.
    Replica(Record),
    /// Application record, including deletion tombstones.
    Application(Record),
}

impl Inbound {
    /// Classify a delivery by its topic, then parse the payload.
    pub fn classify(topic: &str, payload: &[u8]) -> Result<Self, ProtocolError> {
        let is_discovery = topic == DISCOVERY_CHANNEL
            || topic
                .strip_prefix(DISCOVERY_CHANNEL)
                .map_or(false, |rest| rest.starts_with('/'));

        if topic == HEARTBEAT_CHANNEL {
            HeartbeatMessage::parse(text(topic, payload)?).map(Inbound::Heartbeat)
        } else if is_discovery {
            DiscoveryMessage::parse(text(topic, payload)?).map(Inbound::Discovery)
        } else if topic.starts_with(REPLICATE_PREFIX) {
            record(topic, payload).map(Inbound::Replica)
        } else {
            record(topic, payload).map(Inbound::Application)
        }
    }
}

fn text<'a>(topic: &str, payload: &'a [u8]) -> Result<&'a str, ProtocolError> {
    std::str::from_utf8(payload).map_err(|_| ProtocolError::NotUtf8(topic.to_string()))
}

fn record(topic: &str, payload: &[u8]) -> Result<Record, ProtocolError> {
    Record::from_slice(payload).map_err(|source| ProtocolError::Record {
        topic: topic.to_string(),
        source,
    })
}
