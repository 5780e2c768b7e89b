//! CLI subcommands.

use anyhow::{ensure, Context};
use clap::Subcommand;
use cluster::{Node, NodeConfig, NodeHandle};
use corelib::store::{Ingest, RecordLog, RecordStore};
use corelib::{recompute_ring, Error as CoreError, NodeId, Record};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use transport::Broker;

/// Output of a command, printed by the binary.
pub type CommandResult = anyhow::Result<String>;

/// Topic every simulated node subscribes to and publishes on.
const SIMULATION_TOPIC: &str = "news";

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show a node's predecessor and successor for a membership list.
    Ring {
        /// The node to place.
        #[arg(long)]
        local: NodeId,
        /// Active node ids, e.g. N1 N2 N3.
        #[arg(required = true)]
        ids: Vec<NodeId>,
    },
    /// Replay a durable record log and list the records that survive.
    Log {
        path: PathBuf,
        /// Only list records on these topics.
        #[arg(long = "topic")]
        topics: Vec<String>,
    },
    /// Run a ring of nodes on an in-process broker.
    Simulate {
        #[arg(long, default_value_t = 3)]
        nodes: u64,
        /// Node to crash after the records are published.
        #[arg(long)]
        crash: Option<NodeId>,
        /// Keep each node's durable log under this directory.
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Length of one simulated second, in milliseconds.
        #[arg(long, default_value_t = 10)]
        tick_ms: u64,
    },
}

impl Command {
    pub fn execute(&self) -> CommandResult {
        match self {
            Command::Ring { local, ids } => ring(local, ids),
            Command::Log { path, topics } => show_log(path, topics),
            Command::Simulate {
                nodes,
                crash,
                data_dir,
                tick_ms,
            } => simulate(
                *nodes,
                crash.as_ref(),
                data_dir.as_deref(),
                Duration::from_millis(*tick_ms),
            ),
        }
    }
}

fn ring(local: &NodeId, ids: &[NodeId]) -> CommandResult {
    match recompute_ring(ids, local) {
        Ok(view) => Ok(format!(
            "{local}: predecessor={} successor={} size={}",
            view.predecessor, view.successor, view.size
        )),
        Err(err @ CoreError::NotInRing(_)) => Ok(err.to_string()),
        Err(err) => Err(err.into()),
    }
}

fn show_log(path: &Path, topics: &[String]) -> CommandResult {
    ensure!(path.exists(), "log file {} does not exist", path.display());
    let logged = RecordLog::read_path(path)
        .with_context(|| format!("reading log {}", path.display()))?;
    let total = logged.len();

    let mut store = RecordStore::new();
    for record in logged {
        store.accept(record, Ingest::Replay);
    }
    let survivors = if topics.is_empty() {
        store.records().to_vec()
    } else {
        store.by_topics(topics)
    };

    let mut out = format!("{} of {} logged records", survivors.len(), total);
    for record in &survivors {
        let _ = write!(out, "\n{}", describe(record));
    }
    Ok(out)
}

fn describe(record: &Record) -> String {
    match record.target_id() {
        Some(target) => format!("{} [{}] deletes {}", record.id, record.topic, target),
        None => format!("{} [{}] {}", record.id, record.topic, record.title),
    }
}

fn simulate(
    nodes: u64,
    crash: Option<&NodeId>,
    data_dir: Option<&Path>,
    tick: Duration,
) -> CommandResult {
    ensure!(nodes >= 1, "a ring needs at least one node");
    if let Some(crash) = crash {
        ensure!(
            crash.index().map_or(false, |i| (1..=nodes).contains(&i)),
            "{crash} is not one of the {nodes} simulated nodes"
        );
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    runtime.block_on(run_simulation(nodes, crash, data_dir, tick))
}

async fn run_simulation(
    nodes: u64,
    crash: Option<&NodeId>,
    data_dir: Option<&Path>,
    tick: Duration,
) -> CommandResult {
    let broker = Broker::new();
    let mut handles: Vec<NodeHandle> = Vec::new();

    for i in 1..=nodes {
        let id = NodeId::from_index(i);
        let mut config = NodeConfig::new(id.clone())
            .scaled(tick)
            .with_topics([SIMULATION_TOPIC]);
        if let Some(dir) = data_dir {
            config = config.with_log_path(dir.join(format!("{id}.log")));
        }
        let (client, deliveries) = broker.connect(id.to_string());
        let node = Node::new(config, Arc::new(client)).with_context(|| format!("creating {id}"))?;
        let handle = node
            .start(deliveries)
            .await
            .with_context(|| format!("starting {id}"))?;
        handles.push(handle);
    }
    tokio::time::sleep(tick * 5).await;

    for handle in &handles {
        let node = handle.node();
        let record = Record::new(
            node.id(),
            format!("Hello from {}", node.id()),
            "simulated",
            SIMULATION_TOPIC,
        );
        node.publish(record)
            .await
            .with_context(|| format!("publishing from {}", node.id()))?;
    }
    tokio::time::sleep(tick * 5).await;

    if let Some(crashed) = crash {
        if let Some(pos) = handles.iter().position(|h| h.node().id() == crashed) {
            let handle = handles.remove(pos);
            broker.disconnect(crashed.as_str());
            handle.shutdown();
            info!(node = %crashed, "crashed node");

            let deadline = tokio::time::Instant::now() + tick * 200;
            while handles
                .iter()
                .any(|h| h.node().members().contains(crashed))
            {
                if tokio::time::Instant::now() >= deadline {
                    warn!(node = %crashed, "crashed node still in some ring views");
                    break;
                }
                tokio::time::sleep(tick).await;
            }
        }
    }

    let mut report = String::new();
    for handle in &handles {
        let node = handle.node();
        let view = node
            .view()
            .map_or_else(|| "not in ring".to_string(), |v| v.to_string());
        let _ = writeln!(report, "{} {} records={}", node.id(), view, node.records().len());
    }
    for handle in handles {
        handle.shutdown();
    }
    Ok(report.trim_end().to_string())
}
