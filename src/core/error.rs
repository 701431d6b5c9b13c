use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("Lock timeout: {} not acquired within {waited_ms}ms", path.display())]
    LockTimeout { path: PathBuf, waited_ms: u64 },
    #[error("Corrupt state document {}: {reason}", path.display())]
    CorruptState { path: PathBuf, reason: String },
    #[error("Corrupt data for handle '{handle}': {reason}")]
    CorruptData { handle: String, reason: String },
    #[error("Unsupported payload: {0}")]
    UnsupportedPayload(String),
    #[error("Unknown universe: {0}")]
    UnknownUniverse(String),
    #[error("Missing member: {0}")]
    MissingMember(String),
    #[error("Membership cycle: {0}")]
    MembershipCycle(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Config error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// True for failures a caller may simply retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::LockTimeout { .. })
    }
}
