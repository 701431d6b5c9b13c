use crate::core::error::{Result, StoreError};
use crate::core::time;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const JOURNAL_FILE_NAME: &str = ".journal.jsonl";

/// Append-only record of mutations applied to one container.
/// Entries are written while the record lock is held, so lines never interleave.
#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
    enabled: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct JournalEvent {
    pub ts: String,
    pub event_id: String,
    pub actor: String,
    pub op: String,
    pub record: String,
    pub status: String,
}

impl Journal {
    pub fn new(basedir: &Path, enabled: bool) -> Self {
        Self {
            path: basedir.join(JOURNAL_FILE_NAME),
            enabled,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record<T>(&self, op: &str, record: &str, outcome: &Result<T>) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let ev = JournalEvent {
            ts: time::now_epoch_z(),
            event_id: time::new_event_id(),
            actor: format!("pid:{}", std::process::id()),
            op: op.to_string(),
            record: record.to_string(),
            status: if outcome.is_ok() { "success" } else { "error" }.to_string(),
        };
        let line = serde_json::to_string(&ev)
            .map_err(|e| StoreError::ValidationError(format!("journal encode failed: {}", e)))?;

        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(StoreError::IoError)?;
        writeln!(f, "{}", line).map_err(StoreError::IoError)?;
        Ok(())
    }

    /// Journal `outcome` and hand it back unchanged. The journal only describes what already
    /// happened, so an append failure never replaces the outcome of the mutation.
    pub fn finish<T>(&self, op: &str, record: &str, outcome: Result<T>) -> Result<T> {
        let _ = self.record(op, record, &outcome);
        outcome
    }

    pub fn events(&self) -> Result<Vec<JournalEvent>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path).map_err(StoreError::IoError)?;
        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| {
                serde_json::from_str(l).map_err(|e| StoreError::CorruptState {
                    path: self.path.clone(),
                    reason: format!("bad journal line: {}", e),
                })
            })
            .collect()
    }
}
