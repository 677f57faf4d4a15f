use serde::{Deserialize, Serialize};
use tempora_core::{clock::DEFAULT_MAX_DRIFT_MS, ident::DEFAULT_MAX_IDENTIFIER_LEN};
use tempora_storage::StorageOptions;

use crate::EngineError;

/// Engine settings. Every field has a default, so a partial TOML document
/// (or an empty one) is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Longest allowed table name, derived names included.
    pub max_identifier_len: usize,
    pub busy_timeout_ms: u32,
    /// How far ahead of local wall time another connection's timestamps
    /// may be before the transaction is refused.
    pub max_clock_drift_ms: u64,
    pub wal: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_identifier_len: DEFAULT_MAX_IDENTIFIER_LEN,
            busy_timeout_ms: 5000,
            max_clock_drift_ms: DEFAULT_MAX_DRIFT_MS,
            wal: true,
        }
    }
}

impl EngineConfig {
    pub fn from_toml(toml_str: &str) -> Result<Self, EngineError> {
        let config: Self = toml::from_str(toml_str).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        // Room for at least a one-byte live name plus `__tracking`.
        if self.max_identifier_len <= tempora_core::ident::TRACKING_SUFFIX.len() {
            return Err(EngineError::Config(format!(
                "max_identifier_len {} leaves no room for derived table names",
                self.max_identifier_len
            )));
        }
        Ok(())
    }

    pub fn storage_options(&self) -> StorageOptions {
        StorageOptions {
            busy_timeout_ms: self.busy_timeout_ms,
            wal: self.wal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        assert_eq!(EngineConfig::from_toml("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn partial_document_overrides_only_named_fields() {
        let config = EngineConfig::from_toml("max_identifier_len = 40\nwal = false").unwrap();
        assert_eq!(config.max_identifier_len, 40);
        assert!(!config.wal);
        assert_eq!(config.busy_timeout_ms, 5000);
    }

    #[test]
    fn unusable_identifier_limit_is_rejected() {
        assert!(matches!(
            EngineConfig::from_toml("max_identifier_len = 5"),
            Err(EngineError::Config(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml("max_identifier_len = \"long\""),
            Err(EngineError::Config(_))
        ));
    }
}
