//! Publish/subscribe transport for the news ring.
//!
//! This crate provides:
//! - The transport contract nodes publish and subscribe through
//! - The control-channel protocol (heartbeats, discovery) and message
//!   classification at the transport boundary
//! - An in-process broker implementing the contract for tests and simulation

pub mod broker;
pub mod error;
pub mod protocol;

pub use broker::{Broker, BrokerClient, Delivery, Transport};
pub use error::{ProtocolError, TransportError};
pub use protocol::{DiscoveryMessage, HeartbeatMessage, Inbound};
