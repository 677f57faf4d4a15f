//! The catalog: `live table ↔ history table ↔ tracking table ↔
//! interception state`, persisted in `tempora_catalog`.
//!
//! All reads go to the database so that several connections on one file
//! agree; uniqueness of `live_table` is enforced by the primary key rather
//! than by a check-then-insert.

use rusqlite::Connection;
use tempora_core::{ident::Identifier, EntryId, TableSchema, Timestamp};

use crate::error::StorageError;
use crate::records::CatalogEntry;
use crate::values::timestamp_from_row;

const ENTRY_COLUMNS: &str = "entry_id, live_table, history_table, tracking_table, triggers_installed, live_schema, fingerprint, registered_at";

fn read_entry(row: &rusqlite::Row) -> Result<CatalogEntry, StorageError> {
    let entry_id: Vec<u8> = row.get(0)?;
    let live_table: String = row.get(1)?;
    let history_table: String = row.get(2)?;
    let tracking_table: Option<String> = row.get(3)?;
    let triggers_installed: bool = row.get(4)?;
    let schema_bytes: Vec<u8> = row.get(5)?;
    let fingerprint: Vec<u8> = row.get(6)?;

    let entry_id: [u8; 16] = entry_id
        .try_into()
        .map_err(|_| StorageError::Serialization("invalid entry_id length".into()))?;
    let fingerprint: [u8; 32] = fingerprint
        .try_into()
        .map_err(|_| StorageError::Serialization("invalid fingerprint length".into()))?;

    Ok(CatalogEntry {
        entry_id: EntryId::from_bytes(entry_id),
        live_table: Identifier::try_from(live_table)?,
        history_table: Identifier::try_from(history_table)?,
        tracking_table: tracking_table.map(Identifier::try_from).transpose()?,
        triggers_installed,
        schema: TableSchema::from_msgpack(&schema_bytes)?,
        fingerprint,
        registered_at: timestamp_from_row(row, 7)?,
    })
}

fn query_entries(
    conn: &Connection,
    filter: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<CatalogEntry>, StorageError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM tempora_catalog {filter} ORDER BY live_table"
    ))?;
    let mut rows = stmt.query(params)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(read_entry(row)?);
    }
    Ok(out)
}

/// Adds an entry. A second entry for the same live table fails with
/// `AlreadyRegistered`.
pub fn insert(conn: &Connection, entry: &CatalogEntry) -> Result<(), StorageError> {
    let result = conn.execute(
        &format!("INSERT INTO tempora_catalog ({ENTRY_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
        rusqlite::params![
            entry.entry_id.as_bytes().as_slice(),
            entry.live_table.as_str(),
            entry.history_table.as_str(),
            entry.tracking_table.as_ref().map(|t| t.as_str()),
            entry.triggers_installed,
            entry.schema.to_msgpack()?,
            entry.fingerprint.as_slice(),
            &entry.registered_at.to_bytes()[..],
        ],
    );
    match result {
        Ok(_) => Ok(()),
        Err(e) if StorageError::is_key_conflict(&e) => {
            Err(StorageError::AlreadyRegistered(entry.live_table.to_string()))
        }
        Err(e) => Err(StorageError::Sqlite(e)),
    }
}

pub fn find(conn: &Connection, live_table: &str) -> Result<Option<CatalogEntry>, StorageError> {
    Ok(query_entries(conn, "WHERE live_table = ?1", &[&live_table])?
        .into_iter()
        .next())
}

/// Entry for `live_table`, or `NotRegistered`.
pub fn get(conn: &Connection, live_table: &str) -> Result<CatalogEntry, StorageError> {
    find(conn, live_table)?.ok_or_else(|| StorageError::NotRegistered(live_table.to_string()))
}

/// Entry whose history table is `history_table`, or `NotRegistered`.
pub fn get_by_history(conn: &Connection, history_table: &str) -> Result<CatalogEntry, StorageError> {
    query_entries(conn, "WHERE history_table = ?1", &[&history_table])?
        .into_iter()
        .next()
        .ok_or_else(|| StorageError::NotRegistered(history_table.to_string()))
}

pub fn list(conn: &Connection) -> Result<Vec<CatalogEntry>, StorageError> {
    query_entries(conn, "", &[])
}

pub fn remove(conn: &Connection, live_table: &str) -> Result<(), StorageError> {
    let n = conn.execute("DELETE FROM tempora_catalog WHERE live_table = ?1", [live_table])?;
    if n == 0 {
        return Err(StorageError::NotRegistered(live_table.to_string()));
    }
    Ok(())
}

/// Flips the interception flag. Returns whether the stored value changed.
pub fn set_installed(conn: &Connection, live_table: &str, installed: bool) -> Result<bool, StorageError> {
    get(conn, live_table)?;
    let n = conn.execute(
        "UPDATE tempora_catalog SET triggers_installed = ?1 WHERE live_table = ?2 AND triggers_installed <> ?1",
        rusqlite::params![installed, live_table],
    )?;
    Ok(n > 0)
}

/// `(live_table, triggers_installed)` for every entry.
pub fn interception_view(conn: &Connection) -> Result<Vec<(String, bool)>, StorageError> {
    let mut stmt =
        conn.prepare("SELECT live_table, triggers_installed FROM tempora_catalog ORDER BY live_table")?;
    let view = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(view)
}

/// Number of entries whose interception is not installed.
pub fn count_without_interception(conn: &Connection) -> Result<u64, StorageError> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM tempora_catalog WHERE triggers_installed = 0",
        [],
        |row| row.get(0),
    )?;
    Ok(n as u64)
}

pub fn count(conn: &Connection) -> Result<u64, StorageError> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM tempora_catalog", [], |row| row.get(0))?;
    Ok(n as u64)
}

/// Builds the entry for a freshly validated live schema.
pub fn new_entry(
    schema: &TableSchema,
    history_table: Identifier,
    tracking_table: Option<Identifier>,
    installed: bool,
    registered_at: Timestamp,
) -> CatalogEntry {
    CatalogEntry {
        entry_id: EntryId::new(),
        live_table: schema.name().clone(),
        history_table,
        tracking_table,
        triggers_installed: installed,
        schema: schema.clone(),
        fingerprint: schema.fingerprint(),
        registered_at,
    }
}
