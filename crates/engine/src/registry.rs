//! Registration: binding a live table to its history (and tracking) table.

use rusqlite::Connection;
use tempora_core::{ident::Identifier, mirror, TableSchema, Timestamp};
use tempora_storage::{catalog, gaps, history, live, tracking, CatalogEntry, StorageError};
use tracing::{debug, info};

use crate::{audit::check_columns, commit, Engine, EngineError};

impl Engine {
    /// Registers an existing live table. Derived names are validated before
    /// any DDL runs; the catalog entry, history table and tracking table are
    /// created in one transaction with interception installed.
    pub fn register(&mut self, schema: &TableSchema) -> Result<CatalogEntry, EngineError> {
        let max = self.config.max_identifier_len;
        validate_names(schema, max)?;
        let (tx, now) = self.begin()?;
        if !live::table_exists(&tx, schema.name().as_str())? {
            return Err(StorageError::LiveTableMissing(schema.name().to_string()).into());
        }
        let entry = register_in(&tx, schema, max, now)?;
        commit(tx)?;
        info!(table = %entry.live_table, history = %entry.history_table, "registered table");
        Ok(entry)
    }

    /// Creates the live table from `schema` and registers it, atomically.
    pub fn create_table(&mut self, schema: &TableSchema) -> Result<CatalogEntry, EngineError> {
        let max = self.config.max_identifier_len;
        validate_names(schema, max)?;
        let (tx, now) = self.begin()?;
        live::create_live_table(&tx, schema)?;
        let entry = register_in(&tx, schema, max, now)?;
        commit(tx)?;
        info!(table = %entry.live_table, history = %entry.history_table, "created and registered table");
        Ok(entry)
    }

    /// Drops the history and tracking tables of `table` and forgets it.
    /// The live table is left alone.
    pub fn unregister(&mut self, table: &str) -> Result<(), EngineError> {
        let (tx, _) = self.begin()?;
        let entry = catalog::get(&tx, table)?;
        history::drop_history(&tx, &entry.history_schema()?)?;
        if let Some(t) = entry.tracking_schema()? {
            tracking::drop_tracking(&tx, &t)?;
        }
        gaps::clear(&tx, table)?;
        catalog::remove(&tx, table)?;
        commit(tx)?;
        info!(table, "unregistered table");
        Ok(())
    }
}

fn validate_names(schema: &TableSchema, max: usize) -> Result<(), EngineError> {
    Identifier::new(schema.name().as_str(), max)?;
    mirror::history_schema(schema, max)?;
    mirror::tracking_schema(schema, max)?;
    Ok(())
}

fn register_in(
    conn: &Connection,
    schema: &TableSchema,
    max: usize,
    now: Timestamp,
) -> Result<CatalogEntry, EngineError> {
    let name = schema.name().as_str();
    if catalog::find(conn, name)?.is_some() {
        return Err(StorageError::AlreadyRegistered(name.to_owned()).into());
    }
    check_columns(conn, schema)?;

    let hist = history::create_history(conn, schema, max)?;
    let shadow = tracking::create_tracking(conn, schema, max)?;
    if let Some(t) = &shadow {
        // Rows that predate registration are tracked from now on.
        let seeded = tracking::sync_tracking(conn, schema, t, now)?;
        debug!(table = name, rows = seeded.added, "seeded tracking table");
    }
    let entry = catalog::new_entry(schema, hist.table, shadow.map(|t| t.table), true, now);
    catalog::insert(conn, &entry)?;
    Ok(entry)
}
