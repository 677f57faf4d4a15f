//! Repairs tracking tables after writes made while interception was off.

use rusqlite::Connection;
use tempora_core::Timestamp;
use tempora_storage::{catalog, tracking, CatalogEntry};
use tracing::{info, warn};

use crate::{commit, Engine, EngineError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub table: String,
    /// Edition time given to rows that had no tracking row.
    pub synced_at: Timestamp,
    pub added: usize,
    pub removed: usize,
}

impl Engine {
    /// Re-derives the tracking rows of `table` from its live rows. Live rows
    /// missing from the tracking table are stamped with the transaction
    /// timestamp; tracking rows whose live row is gone are dropped. A no-op
    /// for tables with their own `edition_time`.
    pub fn sync(&mut self, table: &str) -> Result<SyncOutcome, EngineError> {
        let (tx, now) = self.begin()?;
        let entry = catalog::get(&tx, table)?;
        let outcome = sync_entry(&tx, &entry, now)?;
        commit(tx)?;
        Ok(outcome)
    }

    /// [`Engine::sync`] over every registered table, in one transaction.
    pub fn sync_all(&mut self) -> Result<Vec<SyncOutcome>, EngineError> {
        let (tx, now) = self.begin()?;
        let mut outcomes = Vec::new();
        for entry in catalog::list(&tx)? {
            outcomes.push(sync_entry(&tx, &entry, now)?);
        }
        commit(tx)?;
        Ok(outcomes)
    }
}

fn sync_entry(conn: &Connection, entry: &CatalogEntry, now: Timestamp) -> Result<SyncOutcome, EngineError> {
    let mut outcome = SyncOutcome {
        table: entry.live_table.to_string(),
        synced_at: now,
        added: 0,
        removed: 0,
    };
    let Some(t) = entry.tracking_schema()? else {
        return Ok(outcome);
    };
    if !entry.triggers_installed {
        warn!(table = %entry.live_table, "syncing tracking table while interception is disabled");
    }
    let counts = tracking::sync_tracking(conn, &entry.schema, &t, now)?;
    outcome.added = counts.added;
    outcome.removed = counts.removed;
    info!(
        table = %entry.live_table,
        added = counts.added,
        removed = counts.removed,
        at = %now,
        "synced tracking table"
    );
    Ok(outcome)
}
