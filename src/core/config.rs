//! Store tuning knobs, loadable from `simstore.toml`.

use crate::core::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "simstore.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Upper bound on waiting for a record lock.
    pub lock_timeout_ms: u64,
    /// Base sleep between lock attempts.
    pub lock_retry_ms: u64,
    /// Lock files older than this are treated as abandoned. 0 disables.
    pub stale_lock_secs: u64,
    /// Extra attempts for reads that observe a half-replaced payload.
    pub read_retries: u32,
    /// Append mutation events to the per-record journal.
    pub journal: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 10_000,
            lock_retry_ms: 10,
            stale_lock_secs: 300,
            read_retries: 3,
            journal: true,
        }
    }
}

impl StoreConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn lock_retry(&self) -> Duration {
        Duration::from_millis(self.lock_retry_ms.max(1))
    }

    pub fn stale_lock_after(&self) -> Option<Duration> {
        (self.stale_lock_secs > 0).then(|| Duration::from_secs(self.stale_lock_secs))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| StoreError::ConfigError(e.to_string()))
    }

    /// Load `<dir>/simstore.toml`. No file means defaults.
    pub fn load(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&config_path).map_err(StoreError::IoError)?;
        Self::from_toml_str(&content).map_err(|e| match e {
            StoreError::ConfigError(msg) => {
                StoreError::ConfigError(format!("{}: {}", config_path.display(), msg))
            }
            other => other,
        })
    }
}
