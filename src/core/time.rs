//! Shared timestamp and identifier helpers.

use ulid::Ulid;

/// Returns unix-epoch seconds with `Z` suffix (e.g. `1771220592Z`).
pub fn now_epoch_z() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("{}Z", secs)
}

pub fn new_event_id() -> String {
    Ulid::new().to_string()
}

/// Fresh record identifier. Stable for the lifetime of the record.
pub fn new_record_id() -> String {
    Ulid::new().to_string()
}

pub fn is_record_id(s: &str) -> bool {
    Ulid::from_string(s).is_ok()
}

/// Suffix for staging files so concurrent writers never share a temp path.
pub fn temp_suffix() -> String {
    Ulid::new().to_string().to_lowercase()
}
