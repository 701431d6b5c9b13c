//! Per-record exclusive lock.
//!
//! The lock is a file created with `create_new`, which gives single-winner semantics per
//! path across threads and processes. Each lease stamps the file with a unique token and
//! removes it on drop only while the token is still its own, so release happens on every
//! exit path without touching a lock someone else has since taken.

use crate::core::config::StoreConfig;
use crate::core::error::{Result, StoreError};
use crate::core::time;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

pub const LOCK_FILE_NAME: &str = ".lock";

pub fn lock_path(basedir: &Path) -> PathBuf {
    basedir.join(LOCK_FILE_NAME)
}

#[derive(Debug)]
pub struct LockLease {
    path: PathBuf,
    stamp: String,
    _file: File,
}

impl LockLease {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Follow the lock file after its directory was renamed while held.
    pub fn relocate(&mut self, new_path: PathBuf) {
        self.path = new_path;
    }
}

impl Drop for LockLease {
    fn drop(&mut self) {
        if fs::read_to_string(&self.path).is_ok_and(|held| held == self.stamp) {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Block until the lock at `lock_path` is ours or the configured timeout passes.
pub fn acquire(lock_path: &Path, config: &StoreConfig) -> Result<LockLease> {
    let started = Instant::now();
    let timeout = config.lock_timeout();
    loop {
        if let Some(lease) = try_acquire_lock(lock_path)? {
            return Ok(lease);
        }
        if let Some(stale_after) = config.stale_lock_after() {
            if break_if_stale(lock_path, stale_after) {
                continue;
            }
        }
        let waited = started.elapsed();
        if waited >= timeout {
            return Err(StoreError::LockTimeout {
                path: lock_path.to_path_buf(),
                waited_ms: waited.as_millis() as u64,
            });
        }
        let pause = config.lock_retry() + Duration::from_millis(jitter_ms(config.lock_retry_ms));
        std::thread::sleep(pause.min(timeout.saturating_sub(waited)).max(Duration::from_millis(1)));
    }
}

pub fn try_acquire_lock(lock_path: &Path) -> Result<Option<LockLease>> {
    let mut file = match OpenOptions::new()
        .create_new(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(lock_path)
    {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => return Ok(None),
        Err(err) => return Err(StoreError::IoError(err)),
    };

    let stamp = format!(
        "pid:{} ts:{} token:{}\n",
        std::process::id(),
        time::now_epoch_z(),
        time::new_event_id()
    );
    if let Err(err) = file.write_all(stamp.as_bytes()).and_then(|_| file.sync_all()) {
        drop(file);
        let _ = fs::remove_file(lock_path);
        return Err(StoreError::IoError(err));
    }

    Ok(Some(LockLease {
        path: lock_path.to_path_buf(),
        stamp,
        _file: file,
    }))
}

fn break_if_stale(lock_path: &Path, stale_after: Duration) -> bool {
    let Ok(meta) = fs::metadata(lock_path) else {
        return false;
    };
    let age = meta
        .modified()
        .ok()
        .and_then(|m| SystemTime::now().duration_since(m).ok())
        .unwrap_or_default();
    if age < stale_after {
        return false;
    }
    match fs::read_to_string(lock_path) {
        Ok(seen) => break_lock(lock_path, &seen),
        Err(_) => false,
    }
}

/// Park the lock under a unique name and keep it broken only if it is still the one
/// inspected as `seen`. A lock that was replaced in between is linked back into place.
fn break_lock(lock_path: &Path, seen: &str) -> bool {
    let parked = lock_path.with_file_name(format!(
        "{}.{}.stale",
        LOCK_FILE_NAME,
        time::temp_suffix()
    ));
    if fs::rename(lock_path, &parked).is_err() {
        return false;
    }
    let broken = fs::read_to_string(&parked).is_ok_and(|moved| moved == seen);
    if !broken {
        let _ = fs::hard_link(&parked, lock_path);
    }
    let _ = fs::remove_file(&parked);
    broken
}

fn jitter_ms(max_exclusive: u64) -> u64 {
    if max_exclusive <= 1 {
        return 0;
    }
    let now_ns = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64;
    now_ns % max_exclusive
}
