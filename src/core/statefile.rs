//! Lock-guarded read/modify/write of a container's state document.

use crate::core::config::StoreConfig;
use crate::core::document::StateDocument;
use crate::core::error::{Result, StoreError};
use crate::core::journal::Journal;
use crate::core::lock::{self, LockLease};
use crate::core::time;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
    lock_path: PathBuf,
    journal: Journal,
    config: StoreConfig,
}

impl StateFile {
    pub fn new(basedir: &Path, file_name: &str, config: &StoreConfig) -> Self {
        Self {
            path: basedir.join(file_name),
            lock_path: lock::lock_path(basedir),
            journal: Journal::new(basedir, config.journal),
            config: config.clone(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn lock(&self) -> Result<LockLease> {
        lock::acquire(&self.lock_path, &self.config)
    }

    /// Lock-free read. Writers replace the file by rename, so this sees a whole document.
    pub fn read(&self) -> Result<StateDocument> {
        read_document(&self.path)
    }

    pub fn write(&self, op: &str, doc: &StateDocument) -> Result<()> {
        let _lease = self.lock()?;
        let outcome = doc
            .validate(&self.path)
            .and_then(|_| write_document(&self.path, doc));
        self.journal.finish(op, &doc.uuid, outcome)
    }

    /// Read-modify-write under the record lock. When `f` fails the stored document is untouched.
    pub fn update<F, R>(&self, op: &str, f: F) -> Result<R>
    where
        F: FnOnce(&mut StateDocument) -> Result<R>,
    {
        let _lease = self.lock()?;
        self.update_locked(op, f)
    }

    /// Same as [`StateFile::update`] for callers already holding the lease.
    pub fn update_locked<F, R>(&self, op: &str, f: F) -> Result<R>
    where
        F: FnOnce(&mut StateDocument) -> Result<R>,
    {
        let mut doc = self.read()?;
        let record = doc.uuid.clone();
        let before = doc.clone();

        let outcome = f(&mut doc).and_then(|value| {
            if doc != before {
                if doc.uuid != before.uuid || doc.containertype != before.containertype {
                    return Err(StoreError::ValidationError(
                        "uuid and containertype are immutable".to_string(),
                    ));
                }
                doc.validate(&self.path)?;
                write_document(&self.path, &doc)?;
            }
            Ok(value)
        });
        self.journal.finish(op, &record, outcome)
    }
}

pub fn read_document(path: &Path) -> Result<StateDocument> {
    let bytes = fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => StoreError::MissingMember(format!(
            "no state document at {}",
            path.display()
        )),
        _ => StoreError::IoError(e),
    })?;
    let doc: StateDocument = serde_json::from_slice(&bytes).map_err(|e| StoreError::CorruptState {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    doc.validate(path)?;
    Ok(doc)
}

/// Stage next to the target, flush, then rename into place.
pub fn write_document(path: &Path, doc: &StateDocument) -> Result<()> {
    let body = serde_json::to_vec_pretty(doc)
        .map_err(|e| StoreError::ValidationError(format!("state encode failed: {}", e)))?;
    write_atomic(path, &body)
}

pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().ok_or_else(|| {
        StoreError::ValidationError(format!("{} has no parent directory", path.display()))
    })?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = dir.join(format!(".{}.{}.tmp", file_name, time::temp_suffix()));

    let staged = (|| -> Result<()> {
        let mut f = File::create(&tmp).map_err(StoreError::IoError)?;
        f.write_all(bytes).map_err(StoreError::IoError)?;
        f.sync_all().map_err(StoreError::IoError)?;
        fs::rename(&tmp, path).map_err(StoreError::IoError)
    })();
    if staged.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    staged
}
