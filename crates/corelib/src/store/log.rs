//! Durable append-only record log.
//!
//! One JSON record per line. Replay order is file order, which is the order
//! records were accepted in.

use crate::error::Result;
use crate::record::Record;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// File-backed JSON-lines log of accepted records.
#[derive(Debug)]
pub struct RecordLog {
    path: PathBuf,
    file: File,
}

impl RecordLog {
    /// Open (creating if needed) the log at `path` for appending.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single line.
    pub fn append(&mut self, record: &Record) -> Result<()> {
        let mut line = record.to_json()?;
        line.push('\n');
        self.file.write_all(line.as_bytes())?;
        self.file.flush()?;
        Ok(())
    }

    /// Read every record currently in the log.
    pub fn read_all(&self) -> Result<Vec<Record>> {
        Self::read_path(&self.path)
    }

    /// Read a log file without opening it for writing.
    ///
    /// A missing file is an empty log. Lines that fail to parse (e.g. a torn
    /// final write) are skipped with a warning.
    pub fn read_path(path: impl AsRef<Path>) -> Result<Vec<Record>> {
        let path = path.as_ref();
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match Record::from_json(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    path = %path.display(),
                    line = lineno + 1,
                    error = %e,
                    "skipping malformed log line"
                ),
            }
        }
        Ok(records)
    }
}
