//! Catalog inspection and whole-database audit.

use std::collections::{BTreeMap, BTreeSet};

use rusqlite::Connection;
use tempora_core::TableSchema;
use tempora_storage::{catalog, live, schema::internal_tables, CatalogEntry};
use tracing::warn;

use crate::{Engine, EngineError};

/// The application's statement of which tables it expects to be versioned
/// and which it deliberately keeps without history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDeclaration {
    versioned: BTreeSet<String>,
    exempt: BTreeSet<String>,
}

impl SchemaDeclaration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn versioned<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.versioned.extend(tables.into_iter().map(Into::into));
        self
    }

    pub fn exempt<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exempt.extend(tables.into_iter().map(Into::into));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableClass {
    /// A registered live table.
    Versioned { interception: bool },
    History { live_table: String },
    Tracking { live_table: String },
    /// Bookkeeping tables of the engine itself.
    Internal,
    Exempt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditReport {
    /// Every table in the database, by name.
    pub tables: BTreeMap<String, TableClass>,
}

impl AuditReport {
    /// Registered tables whose interception is currently removed.
    pub fn without_interception(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|(_, class)| matches!(class, TableClass::Versioned { interception: false }))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn class_of(&self, table: &str) -> Option<&TableClass> {
        self.tables.get(table)
    }
}

impl Engine {
    /// Every catalog entry, ordered by live table name.
    pub fn inspect(&self) -> Result<Vec<CatalogEntry>, EngineError> {
        Ok(catalog::list(self.storage().conn())?)
    }

    /// The entry whose history table is `history_table`.
    pub fn entry_for_history(&self, history_table: &str) -> Result<CatalogEntry, EngineError> {
        Ok(catalog::get_by_history(self.storage().conn(), history_table)?)
    }

    /// Classifies every table in the database against `declared`.
    ///
    /// Fails with `NotRegistered` when a declared versioned table has no
    /// catalog entry, with `ExemptTableRegistered` when a declared exempt
    /// table has one, and with `UnaccountedTables` when any table is neither
    /// declared nor derived from a registration.
    pub fn audit(&self, declared: &SchemaDeclaration) -> Result<AuditReport, EngineError> {
        let conn = self.storage().conn();
        let entries = catalog::list(conn)?;

        let mut known: BTreeMap<String, TableClass> = BTreeMap::new();
        for name in internal_tables() {
            known.insert(name.to_owned(), TableClass::Internal);
        }
        for entry in &entries {
            let live_table = entry.live_table.to_string();
            if declared.exempt.contains(&live_table) {
                return Err(EngineError::ExemptTableRegistered(live_table));
            }
            known.insert(
                entry.history_table.to_string(),
                TableClass::History {
                    live_table: live_table.clone(),
                },
            );
            if let Some(t) = &entry.tracking_table {
                known.insert(
                    t.to_string(),
                    TableClass::Tracking {
                        live_table: live_table.clone(),
                    },
                );
            }
            if declared.versioned.contains(&live_table) {
                known.insert(
                    live_table,
                    TableClass::Versioned {
                        interception: entry.triggers_installed,
                    },
                );
            }
        }
        for table in &declared.versioned {
            if !known.contains_key(table) {
                return Err(tempora_storage::StorageError::NotRegistered(table.clone()).into());
            }
        }
        for table in &declared.exempt {
            known.entry(table.clone()).or_insert(TableClass::Exempt);
        }

        let mut tables = BTreeMap::new();
        let mut unaccounted = Vec::new();
        for name in live::list_tables(conn)? {
            match known.remove(&name) {
                Some(class) => {
                    tables.insert(name, class);
                }
                None => unaccounted.push(name),
            }
        }
        if !unaccounted.is_empty() {
            warn!(tables = ?unaccounted, "audit found unaccounted tables");
            return Err(EngineError::UnaccountedTables(unaccounted));
        }

        let report = AuditReport { tables };
        let missing = report.without_interception();
        if !missing.is_empty() {
            warn!(tables = ?missing, "registered tables without interception");
        }
        Ok(report)
    }

    /// Compares the live table's current columns with the schema recorded
    /// at registration.
    pub fn verify_schema(&self, table: &str) -> Result<(), EngineError> {
        let conn = self.storage().conn();
        let entry = catalog::get(conn, table)?;
        check_columns(conn, &entry.schema)
    }
}

/// Fails with `SchemaDrift` unless the live table has exactly the columns
/// of `schema`. Declared types are not compared; SQLite accepts any type
/// name.
pub(crate) fn check_columns(conn: &Connection, schema: &TableSchema) -> Result<(), EngineError> {
    let observed: BTreeSet<String> = live::observed_columns(conn, schema.name().as_str())?
        .into_iter()
        .collect();
    let expected: BTreeSet<String> = schema.columns().iter().map(|c| c.name.to_string()).collect();
    if observed == expected {
        return Ok(());
    }
    Err(EngineError::SchemaDrift {
        table: schema.name().to_string(),
        missing: expected.difference(&observed).cloned().collect(),
        unexpected: observed.difference(&expected).cloned().collect(),
    })
}
