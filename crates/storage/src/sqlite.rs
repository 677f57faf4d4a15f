use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use tempora_core::Timestamp;

use crate::error::StorageError;
use crate::schema::StorageOptions;

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        Self::open_with(path, &StorageOptions::default())
    }

    pub fn open_with(path: &str, options: &StorageOptions) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn, options)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn, &StorageOptions::default())?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Starts a write transaction. `BEGIN IMMEDIATE` takes the database
    /// write lock up front, so every writer on the file is serialised and
    /// reads inside the transaction see the state the writes apply to.
    pub fn begin(&mut self) -> Result<Transaction<'_>, StorageError> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }
}

/// Highest transaction timestamp ever issued against this database.
pub fn high_water_mark(conn: &Connection) -> Result<Option<Timestamp>, StorageError> {
    let mut stmt = conn.prepare("SELECT high_water FROM tempora_clock WHERE id = 1")?;
    let bytes: Option<Vec<u8>> = stmt.query_row([], |row| row.get(0)).optional()?;
    bytes
        .map(|b| Timestamp::from_slice(&b).map_err(StorageError::from))
        .transpose()
}

/// Records `ts` as the new high-water mark. Never moves backwards.
pub fn advance_high_water(conn: &Connection, ts: Timestamp) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO tempora_clock (id, high_water) VALUES (1, ?1)
         ON CONFLICT(id) DO UPDATE SET high_water = excluded.high_water
         WHERE excluded.high_water > tempora_clock.high_water",
        rusqlite::params![&ts.to_bytes()[..]],
    )?;
    Ok(())
}
