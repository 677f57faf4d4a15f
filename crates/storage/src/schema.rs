use rusqlite::Connection;

use crate::error::StorageError;

pub const SCHEMA_VERSION: i32 = 1;

pub const CATALOG_TABLE: &str = "tempora_catalog";
pub const CLOCK_TABLE: &str = "tempora_clock";
pub const VERSION_TABLE: &str = "tempora_schema_version";
pub const GAP_TABLE: &str = "tempora_interception_gap";

/// Connection-level settings applied when a database is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageOptions {
    pub busy_timeout_ms: u32,
    pub wal: bool,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5000,
            wal: true,
        }
    }
}

pub fn init_schema(conn: &Connection, options: &StorageOptions) -> Result<(), StorageError> {
    let journal = if options.wal { "WAL" } else { "DELETE" };
    conn.execute_batch(&format!(
        "
        PRAGMA journal_mode = {journal};
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA cache_size = -32000;
        PRAGMA busy_timeout = {};
    ",
        options.busy_timeout_ms
    ))?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

/// Tables owned by the engine itself. Never live, never derived.
pub fn internal_tables() -> [&'static str; 4] {
    [CATALOG_TABLE, CLOCK_TABLE, VERSION_TABLE, GAP_TABLE]
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS tempora_schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
INSERT OR IGNORE INTO tempora_schema_version (version, applied_at) VALUES (1, unixepoch());

CREATE TABLE IF NOT EXISTS tempora_catalog (
    live_table TEXT PRIMARY KEY,
    history_table TEXT NOT NULL UNIQUE,
    tracking_table TEXT UNIQUE,
    triggers_installed INTEGER NOT NULL DEFAULT 0 CHECK (triggers_installed IN (0, 1)),
    entry_id BLOB NOT NULL UNIQUE CHECK (length(entry_id) = 16),
    live_schema BLOB NOT NULL,
    fingerprint BLOB NOT NULL CHECK (length(fingerprint) = 32),
    registered_at BLOB NOT NULL CHECK (length(registered_at) = 12)
);

CREATE TABLE IF NOT EXISTS tempora_clock (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    high_water BLOB NOT NULL CHECK (length(high_water) = 12)
);

CREATE TABLE IF NOT EXISTS tempora_interception_gap (
    live_table TEXT NOT NULL,
    disabled_at BLOB NOT NULL CHECK (length(disabled_at) = 12),
    enabled_at BLOB CHECK (enabled_at IS NULL OR length(enabled_at) = 12),
    PRIMARY KEY (live_table, disabled_at)
);
";
