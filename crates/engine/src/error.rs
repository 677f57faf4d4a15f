use tempora_core::CoreError;
use tempora_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("interception already installed on {0}")]
    InterceptionAlreadyInstalled(String),

    #[error("interception not installed on {0}")]
    InterceptionNotInstalled(String),

    #[error("tables not declared as versioned or exempt: {}", .0.join(", "))]
    UnaccountedTables(Vec<String>),

    #[error("table {0} is declared exempt but is registered for history")]
    ExemptTableRegistered(String),

    #[error("schema drift on {table}: missing [{}], unexpected [{}]", .missing.join(", "), .unexpected.join(", "))]
    SchemaDrift {
        table: String,
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("config error: {0}")]
    Config(String),
}

impl EngineError {
    fn core(&self) -> Option<&CoreError> {
        match self {
            Self::Core(e) | Self::Storage(StorageError::Core(e)) => Some(e),
            _ => None,
        }
    }

    pub fn is_not_registered(&self) -> bool {
        matches!(self, Self::Storage(StorageError::NotRegistered(_)))
    }

    pub fn is_already_registered(&self) -> bool {
        matches!(self, Self::Storage(StorageError::AlreadyRegistered(_)))
    }

    pub fn is_identifier_too_long(&self) -> bool {
        matches!(self.core(), Some(CoreError::IdentifierTooLong { .. }))
    }

    pub fn is_row_not_found(&self) -> bool {
        matches!(self, Self::Storage(StorageError::RowNotFound { .. }))
    }
}
