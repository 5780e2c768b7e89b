//! Command-line arguments and logging setup.

use crate::commands::Command;
use anyhow::Context;
use clap::Parser;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::Level;

/// Inspect and simulate a ring of news nodes.
#[derive(Debug, Parser)]
#[command(name = "ringnews", version, about)]
pub struct CliConfig {
    #[command(subcommand)]
    pub command: Command,

    /// Most verbose level to log (error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "info")]
    pub log_level: Level,

    /// Append logs to this file instead of stderr.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

impl CliConfig {
    pub fn run(self) -> anyhow::Result<()> {
        self.init_logging()?;
        let report = self.command.execute()?;
        println!("{report}");
        Ok(())
    }

    fn init_logging(&self) -> anyhow::Result<()> {
        let builder = tracing_subscriber::fmt().with_max_level(self.log_level);
        match &self.log_file {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("opening log file {}", path.display()))?;
                builder.with_writer(Mutex::new(file)).with_ansi(false).init();
            }
            None => builder.with_writer(std::io::stderr).init(),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let config = CliConfig::parse_from([
            "ringnews", "ring", "--local", "N2", "N1", "N2", "N3", "--log-level", "debug",
        ]);
        assert_eq!(config.log_level, Level::DEBUG);
        assert!(config.log_file.is_none());
        assert!(matches!(config.command, Command::Ring { .. }));
    }

    #[test]
    fn test_simulate_defaults() {
        let config = CliConfig::parse_from(["ringnews", "simulate"]);
        match config.command {
            Command::Simulate {
                nodes,
                crash,
                tick_ms,
                ..
            } => {
                assert_eq!(nodes, 3);
                assert!(crash.is_none());
                assert_eq!(tick_ms, 10);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
