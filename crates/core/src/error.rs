use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("identifier too long: {name:?} is {len} bytes (max {max})")]
    IdentifierTooLong { name: String, len: usize, max: usize },

    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("invalid schema for {table}: {reason}")]
    InvalidSchema { table: String, reason: String },

    #[error("invalid interval: start {start} is after end {end}")]
    InvalidInterval { start: String, end: String },

    #[error("open interval cannot be persisted (start {0})")]
    OpenInterval(String),

    #[error("clock drift too large: remote is {delta_ms}ms ahead (max {max_ms}ms)")]
    ClockDriftTooLarge { delta_ms: u64, max_ms: u64 },

    #[error("invalid data: {0}")]
    InvalidData(String),
}
