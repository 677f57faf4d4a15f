use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("row not found: {table} where {key}")]
    RowNotFound { table: String, key: String },

    #[error("unknown column {column} on {table}")]
    UnknownColumn { table: String, column: String },

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("table already registered: {0}")]
    AlreadyRegistered(String),

    #[error("table not registered: {0}")]
    NotRegistered(String),

    #[error("live table does not exist: {0}")]
    LiveTableMissing(String),

    #[error("core error: {0}")]
    Core(#[from] tempora_core::CoreError),
}

impl StorageError {
    /// A PRIMARY KEY or UNIQUE conflict. Other constraint failures (CHECK,
    /// NOT NULL) are not key conflicts.
    pub(crate) fn is_key_conflict(err: &rusqlite::Error) -> bool {
        use rusqlite::ffi::{SQLITE_CONSTRAINT_PRIMARYKEY, SQLITE_CONSTRAINT_UNIQUE};
        matches!(
            err,
            rusqlite::Error::SqliteFailure(e, _)
                if e.extended_code == SQLITE_CONSTRAINT_PRIMARYKEY
                    || e.extended_code == SQLITE_CONSTRAINT_UNIQUE
        )
    }
}
