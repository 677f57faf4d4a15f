//! Typed SQL identifiers and derived-table naming.
//!
//! Derived names are part of the external contract: other tooling finds a
//! history table as `<live>__history` and a tracking table as
//! `<live>__tracking`. Names are validated against the identifier limit
//! and never truncated, since truncation could map two live tables onto
//! the same derived table.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// PostgreSQL's NAMEDATALEN - 1, kept so catalogs stay portable.
pub const DEFAULT_MAX_IDENTIFIER_LEN: usize = 63;

pub const HISTORY_SUFFIX: &str = "__history";
pub const TRACKING_SUFFIX: &str = "__tracking";

/// Prefix of the engine's own bookkeeping tables.
pub const RESERVED_PREFIX: &str = "tempora_";

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Validates `name` as `[A-Za-z_][A-Za-z0-9_]*` of at most `max_len` bytes.
    pub fn new(name: &str, max_len: usize) -> Result<Self, CoreError> {
        let mut chars = name.chars();
        let valid_head = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if !valid_head || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(CoreError::InvalidIdentifier(name.to_string()));
        }
        if name.len() > max_len {
            return Err(CoreError::IdentifierTooLong {
                name: name.to_string(),
                len: name.len(),
                max: max_len,
            });
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted form for interpolation into SQL.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }

    /// Whether this name is owned by the engine rather than the application.
    pub fn is_reserved(&self) -> bool {
        self.0.starts_with(RESERVED_PREFIX)
            || self.0.ends_with(HISTORY_SUFFIX)
            || self.0.ends_with(TRACKING_SUFFIX)
    }
}

impl TryFrom<String> for Identifier {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Identifier::new(&value, usize::MAX)
    }
}

impl From<Identifier> for String {
    fn from(value: Identifier) -> Self {
        value.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `<live>__history`, or `IdentifierTooLong` if that exceeds `max_len`.
pub fn history_table_name(live: &Identifier, max_len: usize) -> Result<Identifier, CoreError> {
    Identifier::new(&format!("{}{}", live.as_str(), HISTORY_SUFFIX), max_len)
}

/// `<live>__tracking`, or `IdentifierTooLong` if that exceeds `max_len`.
pub fn tracking_table_name(live: &Identifier, max_len: usize) -> Result<Identifier, CoreError> {
    Identifier::new(&format!("{}{}", live.as_str(), TRACKING_SUFFIX), max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsafe_names() {
        for bad in ["", "1abc", "has space", "semi;colon", "quo\"te"] {
            assert!(
                matches!(Identifier::new(bad, 63), Err(CoreError::InvalidIdentifier(_))),
                "{bad:?} should be rejected"
            );
        }
        assert!(Identifier::new("_ok_name1", 63).is_ok());
    }

    #[test]
    fn derived_names_follow_suffix_convention() {
        let live = Identifier::new("project", 63).unwrap();
        assert_eq!(history_table_name(&live, 63).unwrap().as_str(), "project__history");
        assert_eq!(tracking_table_name(&live, 63).unwrap().as_str(), "project__tracking");
    }

    #[test]
    fn derived_name_over_limit_is_an_error_not_truncated() {
        let name = "a_very_very_long_table_name_which_is_pretty_close_to_63_chars";
        let live = Identifier::new(name, 63).unwrap();
        match history_table_name(&live, 63) {
            Err(CoreError::IdentifierTooLong { len, max, .. }) => {
                assert_eq!(len, name.len() + HISTORY_SUFFIX.len());
                assert_eq!(max, 63);
            }
            other => panic!("expected IdentifierTooLong, got {other:?}"),
        }
    }

    #[test]
    fn reserved_names() {
        assert!(Identifier::new("tempora_catalog", 63).unwrap().is_reserved());
        assert!(Identifier::new("class__history", 63).unwrap().is_reserved());
        assert!(!Identifier::new("class", 63).unwrap().is_reserved());
    }
}
