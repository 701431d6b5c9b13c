//! On-disk names and schemas shared across the store.
//!
//! A container directory looks like:
//! 1. `<Type>.<uuid>.json`: the state document (identity, tags, categories, members, universes).
//! 2. `.lock` and `.journal.jsonl`: record lock and mutation journal.
//! 3. `<handle>/`: one directory per stored payload, holding one canonical data file plus
//!    `manifest.json`.

use regex::Regex;
use std::sync::LazyLock;

pub const STATE_SCHEMA_VERSION: u32 = 1;
pub const STATE_FILE_EXT: &str = "json";

// --- Data store files ---
pub const TABULAR_FILE_NAME: &str = "tabular.db";
pub const ARRAY_FILE_NAME: &str = "array.bin";
pub const GENERIC_FILE_NAME: &str = "generic.bin";
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

// Array and generic files start with a format tag and version so foreign files are rejected early.
pub const ARRAY_FILE_MAGIC: &str = "simstore.array";
pub const GENERIC_FILE_MAGIC: &str = "simstore.generic";
pub const PAYLOAD_FILE_VERSION: u16 = 1;

pub const TABULAR_DB_SCHEMA_META: &str = "
    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
";
pub const TABULAR_DB_SCHEMA_COLUMNS: &str = "
    CREATE TABLE IF NOT EXISTS columns (
        position INTEGER PRIMARY KEY,
        label,
        dtype TEXT NOT NULL
    )
";
pub const TABULAR_DB_SCHEMA_ROW_INDEX: &str = "
    CREATE TABLE IF NOT EXISTS row_index (
        position INTEGER PRIMARY KEY,
        label
    )
";
pub const TABULAR_DB_SCHEMA_CELLS: &str = "
    CREATE TABLE IF NOT EXISTS cells (
        col INTEGER NOT NULL,
        row INTEGER NOT NULL,
        value,
        PRIMARY KEY (col, row)
    ) WITHOUT ROWID
";

/// Container names and handle segments: one path segment, no leading dot.
pub static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_\-][A-Za-z0-9_.\- +=@,]*$").unwrap()
});

pub fn is_valid_segment(s: &str) -> bool {
    NAME_PATTERN.is_match(s)
}
