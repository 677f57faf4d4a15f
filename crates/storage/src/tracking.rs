//! Tracking Table Manager: `(live_pk, edition_time)` shadows for live
//! tables without their own `edition_time` column.

use rusqlite::{Connection, OptionalExtension};
use tempora_core::{
    mirror::{self, TrackingSchema, TRACKING_PK},
    schema::EDITION_TIME,
    FieldValue, TableSchema, Timestamp,
};
use tracing::debug;

use crate::error::StorageError;
use crate::records::TrackingRow;
use crate::values::{from_sql, timestamp_from_row, to_sql};

/// Creates the tracking table for `live`, or returns `None` when the live
/// table keeps its own `edition_time`.
pub fn create_tracking(
    conn: &Connection,
    live: &TableSchema,
    max_identifier_len: usize,
) -> Result<Option<TrackingSchema>, StorageError> {
    let Some(tracking) = mirror::tracking_schema(live, max_identifier_len)? else {
        return Ok(None);
    };
    conn.execute_batch(&format!(
        "CREATE TABLE {} (\"{TRACKING_PK}\" {} PRIMARY KEY NOT NULL, \"{EDITION_TIME}\" BLOB NOT NULL CHECK (length(\"{EDITION_TIME}\") = 12));",
        tracking.table.quoted(),
        tracking.pk_type().sql_type(),
    ))?;
    debug!(table = %tracking.table, live = %tracking.live_table, "created tracking table");
    Ok(Some(tracking))
}

pub fn drop_tracking(conn: &Connection, tracking: &TrackingSchema) -> Result<(), StorageError> {
    conn.execute_batch(&format!("DROP TABLE IF EXISTS {};", tracking.table.quoted()))?;
    debug!(table = %tracking.table, "dropped tracking table");
    Ok(())
}

/// Sets the edition time of `pk`, inserting the tracking row if needed.
pub fn touch(
    conn: &Connection,
    tracking: &TrackingSchema,
    pk: &FieldValue,
    edition_time: Timestamp,
) -> Result<(), StorageError> {
    conn.execute(
        &format!(
            "INSERT INTO {t} (\"{TRACKING_PK}\", \"{EDITION_TIME}\") VALUES (?1, ?2)
             ON CONFLICT(\"{TRACKING_PK}\") DO UPDATE SET \"{EDITION_TIME}\" = excluded.\"{EDITION_TIME}\"",
            t = tracking.table.quoted()
        ),
        rusqlite::params![to_sql(pk), &edition_time.to_bytes()[..]],
    )?;
    Ok(())
}

/// Removes the tracking row of `pk`. Returns whether one existed.
pub fn remove(conn: &Connection, tracking: &TrackingSchema, pk: &FieldValue) -> Result<bool, StorageError> {
    let n = conn.execute(
        &format!(
            "DELETE FROM {} WHERE \"{TRACKING_PK}\" = ?1",
            tracking.table.quoted()
        ),
        [to_sql(pk)],
    )?;
    Ok(n > 0)
}

pub fn clear(conn: &Connection, tracking: &TrackingSchema) -> Result<usize, StorageError> {
    Ok(conn.execute(&format!("DELETE FROM {}", tracking.table.quoted()), [])?)
}

pub fn edition_time_of(
    conn: &Connection,
    tracking: &TrackingSchema,
    pk: &FieldValue,
) -> Result<Option<Timestamp>, StorageError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT \"{EDITION_TIME}\" FROM {} WHERE \"{TRACKING_PK}\" = ?1",
        tracking.table.quoted()
    ))?;
    let bytes: Option<Vec<u8>> = stmt.query_row([to_sql(pk)], |row| row.get(0)).optional()?;
    bytes
        .map(|b| Timestamp::from_slice(&b).map_err(StorageError::from))
        .transpose()
}

/// All tracking rows, ordered by edition time then key.
pub fn rows(conn: &Connection, tracking: &TrackingSchema) -> Result<Vec<TrackingRow>, StorageError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT \"{TRACKING_PK}\", \"{EDITION_TIME}\" FROM {} ORDER BY \"{EDITION_TIME}\", \"{TRACKING_PK}\"",
        tracking.table.quoted()
    ))?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(r) = rows.next()? {
        out.push(TrackingRow {
            live_pk: from_sql(r.get_ref(0)?, tracking.pk_type(), TRACKING_PK)?,
            edition_time: timestamp_from_row(r, 1)?,
        });
    }
    Ok(out)
}

/// Outcome of re-deriving tracking membership from the live table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncCounts {
    pub added: usize,
    pub removed: usize,
}

/// Re-derives tracking membership from current live rows: live rows
/// without a tracking row get `edition_time = now`, tracking rows without a
/// live row are removed. Existing tracking rows keep their edition time;
/// a change made while interception was off cannot be dated, so the last
/// known time stands.
pub fn sync_tracking(
    conn: &Connection,
    live: &TableSchema,
    tracking: &TrackingSchema,
    now: Timestamp,
) -> Result<SyncCounts, StorageError> {
    let live_table = live.name().quoted();
    let live_pk = live.primary_key().name.quoted();
    let t = tracking.table.quoted();

    let added = conn.execute(
        &format!(
            "INSERT INTO {t} (\"{TRACKING_PK}\", \"{EDITION_TIME}\")
             SELECT l.{live_pk}, ?1 FROM {live_table} l
             WHERE NOT EXISTS (SELECT 1 FROM {t} k WHERE k.\"{TRACKING_PK}\" = l.{live_pk})"
        ),
        rusqlite::params![&now.to_bytes()[..]],
    )?;
    let removed = conn.execute(
        &format!(
            "DELETE FROM {t} WHERE NOT EXISTS
             (SELECT 1 FROM {live_table} l WHERE l.{live_pk} = {t}.\"{TRACKING_PK}\")"
        ),
        [],
    )?;
    Ok(SyncCounts { added, removed })
}
