//! Installing and removing write-path interception per registered table.

use rusqlite::Connection;
use tempora_core::Timestamp;
use tempora_storage::{catalog, gaps};
use tracing::{debug, info};

use crate::{commit, Engine, EngineError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterceptionSummary {
    pub registered: u64,
    pub without_interception: u64,
}

impl Engine {
    /// Installs interception on every registered table that lacks it.
    /// Returns how many tables were changed.
    pub fn enable(&mut self) -> Result<usize, EngineError> {
        let (tx, now) = self.begin()?;
        let mut changed = 0;
        for (table, installed) in catalog::interception_view(&tx)? {
            if !installed {
                install(&tx, &table, now)?;
                changed += 1;
            }
        }
        commit(tx)?;
        info!(changed, "enabled history tracking");
        Ok(changed)
    }

    /// Visits every registered table and installs interception, treating
    /// tables that already have it as done.
    pub fn enable_tolerant(&mut self) -> Result<usize, EngineError> {
        let (tx, now) = self.begin()?;
        let mut changed = 0;
        for entry in catalog::list(&tx)? {
            match install(&tx, entry.live_table.as_str(), now) {
                Ok(()) => changed += 1,
                Err(EngineError::InterceptionAlreadyInstalled(table)) => {
                    debug!(table = %table, "interception already installed");
                }
                Err(e) => return Err(e),
            }
        }
        commit(tx)?;
        info!(changed, "enabled history tracking");
        Ok(changed)
    }

    /// Removes interception from every registered table. Writes made while
    /// it is off leave no history; the gap is recorded so that `as_of`
    /// does not reconstruct across it.
    pub fn disable(&mut self) -> Result<usize, EngineError> {
        let (tx, now) = self.begin()?;
        let mut changed = 0;
        for (table, installed) in catalog::interception_view(&tx)? {
            if installed {
                uninstall(&tx, &table, now)?;
                changed += 1;
            }
        }
        commit(tx)?;
        info!(changed, "disabled history tracking");
        Ok(changed)
    }

    pub fn enable_table(&mut self, table: &str) -> Result<(), EngineError> {
        let (tx, now) = self.begin()?;
        install(&tx, table, now)?;
        commit(tx)?;
        info!(table, "enabled history tracking");
        Ok(())
    }

    pub fn disable_table(&mut self, table: &str) -> Result<(), EngineError> {
        let (tx, now) = self.begin()?;
        uninstall(&tx, table, now)?;
        commit(tx)?;
        info!(table, "disabled history tracking");
        Ok(())
    }

    pub fn interception_summary(&self) -> Result<InterceptionSummary, EngineError> {
        let conn = self.storage().conn();
        Ok(InterceptionSummary {
            registered: catalog::count(conn)?,
            without_interception: catalog::count_without_interception(conn)?,
        })
    }

    /// Whether `table` currently has interception installed.
    pub fn is_tracking(&self, table: &str) -> Result<bool, EngineError> {
        Ok(catalog::get(self.storage().conn(), table)?.triggers_installed)
    }
}

fn install(conn: &Connection, table: &str, now: Timestamp) -> Result<(), EngineError> {
    if !catalog::set_installed(conn, table, true)? {
        return Err(EngineError::InterceptionAlreadyInstalled(table.to_owned()));
    }
    gaps::close(conn, table, now)?;
    Ok(())
}

fn uninstall(conn: &Connection, table: &str, now: Timestamp) -> Result<(), EngineError> {
    if !catalog::set_installed(conn, table, false)? {
        return Err(EngineError::InterceptionNotInstalled(table.to_owned()));
    }
    gaps::open(conn, table, now)?;
    Ok(())
}
