//! CLI tool for the news ring.
//!
//! Provides commands for:
//! - Computing a node's ring neighbours from a membership list
//! - Inspecting a node's durable record log
//! - Simulating a ring of nodes on an in-process broker

pub mod commands;
pub mod config;

pub use commands::{Command, CommandResult};
pub use config::CliConfig;
