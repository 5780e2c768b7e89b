//! Deduplicated record store.
//!
//! Holds accepted records in insertion order, a dedup index of their ids and
//! (optionally) a durable log mirroring every first-hand acceptance. All
//! mutation goes through [`RecordStore::accept`], which callers run under one
//! lock ([`SharedStore`]) so that check, insert and persist are a single step.

pub mod log;

pub use log::RecordLog;

use crate::error::Result;
use crate::record::Record;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Store shared between message workers and the local publish path.
pub type SharedStore = Arc<Mutex<RecordStore>>;

/// How a record reached the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    /// Originated on this node.
    Local,
    /// Delivered on an application topic.
    Arrival,
    /// Backup copy pushed by our predecessor.
    Replica,
    /// Read back from the durable log at startup.
    Replay,
}

impl Ingest {
    fn persists(self) -> bool {
        !matches!(self, Ingest::Replay)
    }

    /// Whether accepting `record` this way should push it to the successor.
    ///
    /// Local tombstones are replicated so the backup deletes too; tombstones
    /// arriving on the deletion topic are not forwarded again.
    fn replicates(self, record: &Record) -> bool {
        match self {
            Ingest::Local => true,
            Ingest::Arrival => !record.is_tombstone(),
            Ingest::Replica | Ingest::Replay => false,
        }
    }
}

/// Result of [`RecordStore::accept`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acceptance {
    /// Id already known; nothing changed.
    Duplicate,
    /// Id was deleted by an earlier tombstone; not reintroduced.
    Tombstoned,
    /// Stored as a new record.
    Stored { replicate: bool },
    /// Stored a tombstone and applied it to `target`.
    Deleted {
        target: String,
        found: bool,
        replicate: bool,
    },
}

impl Acceptance {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Acceptance::Duplicate)
    }

    /// True when the record was actually added to the store.
    pub fn is_new(&self) -> bool {
        matches!(self, Acceptance::Stored { .. } | Acceptance::Deleted { .. })
    }

    pub fn should_replicate(&self) -> bool {
        match self {
            Acceptance::Duplicate | Acceptance::Tombstoned => false,
            Acceptance::Stored { replicate } | Acceptance::Deleted { replicate, .. } => *replicate,
        }
    }
}

/// Ordered, deduplicated records with an optional durable log.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: Vec<Record>,
    index: HashSet<String>,
    /// Targets of every tombstone seen, so a late copy stays deleted.
    /// Never pruned; grows with the number of deletions.
    deleted: HashSet<String>,
    log: Option<RecordLog>,
}

impl RecordStore {
    /// In-memory store with no durable log.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(log: RecordLog) -> Self {
        Self {
            log: Some(log),
            ..Self::default()
        }
    }

    /// Store backed by the log at `path`. Call [`replay`](Self::replay) to
    /// load what the log already holds.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::with_log(RecordLog::open(path)?))
    }

    pub fn shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        if !self.contains(id) {
            return None;
        }
        self.records.iter().find(|r| r.id == id)
    }

    /// All records in insertion order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Known ids (the dedup index).
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.index.iter().map(String::as_str)
    }

    /// Records whose topic is one of `topics`, in insertion order.
    pub fn by_topics<S: AsRef<str>>(&self, topics: &[S]) -> Vec<Record> {
        self.records
            .iter()
            .filter(|r| topics.iter().any(|t| t.as_ref() == r.topic))
            .cloned()
            .collect()
    }

    /// Ingest a record.
    ///
    /// Known ids, and ids removed by a tombstone already seen, are ignored.
    /// New records are appended to memory and, unless replaying, to the
    /// durable log. A tombstone then removes its target if present. A log
    /// write failure is logged and does not undo the in-memory insert.
    pub fn accept(&mut self, record: Record, ingest: Ingest) -> Acceptance {
        if self.index.contains(&record.id) {
            debug!(id = %record.id, ?ingest, "duplicate record ignored");
            metrics::counter!("ringnews_records_duplicate_total").increment(1);
            return Acceptance::Duplicate;
        }
        if self.deleted.contains(&record.id) {
            debug!(id = %record.id, ?ingest, "record already deleted, not reintroduced");
            return Acceptance::Tombstoned;
        }

        if ingest.persists() {
            if let Some(log) = self.log.as_mut() {
                if let Err(e) = log.append(&record) {
                    warn!(id = %record.id, path = %log.path().display(), error = %e, "failed to persist record");
                }
            }
        }

        let replicate = ingest.replicates(&record);
        let target = record.target_id().map(str::to_string);
        self.index.insert(record.id.clone());
        self.records.push(record);
        metrics::counter!("ringnews_records_accepted_total").increment(1);

        match target {
            Some(target) => {
                self.deleted.insert(target.clone());
                let found = self.remove(&target);
                if found {
                    info!(target = %target, "record deleted");
                } else {
                    info!(target = %target, "record to delete not present");
                }
                Acceptance::Deleted {
                    target,
                    found,
                    replicate,
                }
            }
            None => Acceptance::Stored { replicate },
        }
    }

    /// Load every record from the durable log without re-persisting or
    /// replicating. Returns the number of records that were new.
    pub fn replay(&mut self) -> Result<usize> {
        let records = match &self.log {
            Some(log) => log.read_all()?,
            None => return Ok(0),
        };

        let mut loaded = 0;
        for record in records {
            if self.accept(record, Ingest::Replay).is_new() {
                loaded += 1;
            }
        }
        info!(loaded, total = self.len(), "replayed durable log");
        Ok(loaded)
    }

    fn remove(&mut self, id: &str) -> bool {
        if !self.index.remove(id) {
            return false;
        }
        self.records.retain(|r| r.id != id);
        true
    }
}
