//! Interception gaps: the periods during which a registered table had
//! interception removed. Writes made inside a gap left no history, so
//! point-in-time reads must not reconstruct across one.

use rusqlite::Connection;
use tempora_core::{Interval, Timestamp};

use crate::error::StorageError;
use crate::values::timestamp_from_row;

/// Records that interception on `table` was removed at `at`.
pub fn open(conn: &Connection, table: &str, at: Timestamp) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO tempora_interception_gap (live_table, disabled_at) VALUES (?1, ?2)",
        rusqlite::params![table, &at.to_bytes()[..]],
    )?;
    Ok(())
}

/// Ends the open gap of `table`, if any. Returns whether one was closed.
pub fn close(conn: &Connection, table: &str, at: Timestamp) -> Result<bool, StorageError> {
    let n = conn.execute(
        "UPDATE tempora_interception_gap SET enabled_at = ?2
         WHERE live_table = ?1 AND enabled_at IS NULL",
        rusqlite::params![table, &at.to_bytes()[..]],
    )?;
    Ok(n > 0)
}

/// Every gap of `table` in time order. A gap still in progress is open.
pub fn for_table(conn: &Connection, table: &str) -> Result<Vec<Interval>, StorageError> {
    let mut stmt = conn.prepare(
        "SELECT disabled_at, enabled_at FROM tempora_interception_gap
         WHERE live_table = ?1 ORDER BY disabled_at",
    )?;
    let mut rows = stmt.query([table])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let start = timestamp_from_row(row, 0)?;
        let end: Option<Vec<u8>> = row.get(1)?;
        out.push(match end {
            Some(bytes) => Interval::closed(start, Timestamp::from_slice(&bytes)?)?,
            None => Interval::open(start),
        });
    }
    Ok(out)
}

pub fn clear(conn: &Connection, table: &str) -> Result<usize, StorageError> {
    Ok(conn.execute(
        "DELETE FROM tempora_interception_gap WHERE live_table = ?1",
        [table],
    )?)
}
