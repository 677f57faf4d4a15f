pub mod audit;
pub mod config;
pub mod controller;
pub mod error;
pub mod intercept;
pub mod reconcile;
pub mod registry;
pub mod writer;

pub use audit::{AuditReport, SchemaDeclaration, TableClass};
pub use config::EngineConfig;
pub use controller::InterceptionSummary;
pub use error::EngineError;
pub use reconcile::SyncOutcome;
pub use writer::{MutationOutcome, Writer};

use rusqlite::Transaction;
use tempora_core::{
    schema::{CREATION_TIME, EDITION_TIME},
    Clock, FieldValue, Interval, Row, Timestamp,
};
use tempora_storage::{
    catalog, gaps, history, live,
    sqlite::{advance_high_water, high_water_mark},
    tracking, CatalogEntry, HistoryRow, SqliteStorage, StorageError, TrackingRow,
};
use tracing::debug;

pub(crate) fn commit(tx: Transaction<'_>) -> Result<(), EngineError> {
    tx.commit().map_err(StorageError::from)?;
    Ok(())
}

/// Temporal history engine over one SQLite connection.
///
/// Every write runs in an IMMEDIATE transaction stamped with a single
/// timestamp. Timestamps come from a hybrid logical clock merged with the
/// high-water mark persisted in the database, so transactions from any
/// connection to the same file are totally ordered.
pub struct Engine {
    storage: SqliteStorage,
    clock: Clock,
    config: EngineConfig,
}

impl Engine {
    pub fn new(storage: SqliteStorage, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            storage,
            clock: Clock::with_max_drift(config.max_clock_drift_ms),
            config,
        })
    }

    pub fn open(path: &str, config: EngineConfig) -> Result<Self, EngineError> {
        let storage = SqliteStorage::open_with(path, &config.storage_options())?;
        Self::new(storage, config)
    }

    pub fn open_in_memory() -> Result<Self, EngineError> {
        Self::new(SqliteStorage::open_in_memory()?, EngineConfig::default())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    /// Opens an IMMEDIATE transaction and assigns its timestamp: strictly
    /// later than anything this engine issued and than the persisted
    /// high-water mark, which is advanced before returning.
    pub(crate) fn begin(&mut self) -> Result<(Transaction<'_>, Timestamp), EngineError> {
        let tx = self.storage.begin()?;
        let now = match high_water_mark(&tx)? {
            Some(mark) => self.clock.receive(&mark)?,
            None => self.clock.tick()?,
        };
        advance_high_water(&tx, now)?;
        Ok((tx, now))
    }

    /// Runs `f` as one transaction. Any error returned by `f` rolls back
    /// every write it made, history included.
    pub fn batch<T>(
        &mut self,
        f: impl FnOnce(&mut Writer<'_>) -> Result<T, EngineError>,
    ) -> Result<(T, MutationOutcome), EngineError> {
        let (tx, now) = self.begin()?;
        let mut writer = Writer::new(tx, now);
        let value = f(&mut writer)?;
        let outcome = writer.commit()?;
        Ok((value, outcome))
    }

    pub fn insert(&mut self, table: &str, row: Row) -> Result<(FieldValue, MutationOutcome), EngineError> {
        self.batch(|w| w.insert(table, row))
    }

    pub fn update(&mut self, table: &str, pk: &FieldValue, changes: Row) -> Result<MutationOutcome, EngineError> {
        let ((), outcome) = self.batch(|w| w.update(table, pk, changes))?;
        Ok(outcome)
    }

    pub fn delete(&mut self, table: &str, pk: &FieldValue) -> Result<MutationOutcome, EngineError> {
        let ((), outcome) = self.batch(|w| w.delete(table, pk))?;
        Ok(outcome)
    }

    pub fn truncate(&mut self, table: &str) -> Result<(usize, MutationOutcome), EngineError> {
        self.batch(|w| w.truncate(table))
    }

    fn entry(&self, table: &str) -> Result<CatalogEntry, EngineError> {
        Ok(catalog::get(self.storage.conn(), table)?)
    }

    pub fn get(&self, table: &str, pk: &FieldValue) -> Result<Option<Row>, EngineError> {
        let entry = self.entry(table)?;
        Ok(live::get(self.storage.conn(), &entry.schema, pk)?)
    }

    /// Current rows of a registered table, ordered by key.
    pub fn rows(&self, table: &str) -> Result<Vec<Row>, EngineError> {
        let entry = self.entry(table)?;
        Ok(live::all(self.storage.conn(), &entry.schema)?)
    }

    /// Archived images of one key, oldest first.
    pub fn history(&self, table: &str, pk: &FieldValue) -> Result<Vec<HistoryRow>, EngineError> {
        let hist = self.entry(table)?.history_schema()?;
        Ok(history::history_for_key(self.storage.conn(), &hist, pk)?)
    }

    /// Every archived image of the table, ordered by interval.
    pub fn history_rows(&self, table: &str) -> Result<Vec<HistoryRow>, EngineError> {
        let hist = self.entry(table)?.history_schema()?;
        Ok(history::history_rows(self.storage.conn(), &hist)?)
    }

    /// Tracking rows of the table; empty for tables with their own
    /// `edition_time`.
    pub fn tracking_rows(&self, table: &str) -> Result<Vec<TrackingRow>, EngineError> {
        match self.entry(table)?.tracking_schema()? {
            Some(t) => Ok(tracking::rows(self.storage.conn(), &t)?),
            None => Ok(Vec::new()),
        }
    }

    /// Edition time of a live row: its own column, its tracking row, or
    /// its creation time, in that order.
    pub fn edition_time(&self, table: &str, pk: &FieldValue) -> Result<Option<Timestamp>, EngineError> {
        let entry = self.entry(table)?;
        let conn = self.storage.conn();
        let Some(row) = live::get(conn, &entry.schema, pk)? else {
            return Ok(None);
        };
        let tracked = match entry.tracking_schema()? {
            Some(t) => tracking::edition_time_of(conn, &t, pk)?,
            None => row.get(EDITION_TIME).and_then(FieldValue::as_timestamp),
        };
        Ok(tracked.or_else(|| row.get(CREATION_TIME).and_then(FieldValue::as_timestamp)))
    }

    /// The image of `pk` that was current at `at`: the live row if its
    /// current interval covers `at`, else the archived image whose interval
    /// does.
    ///
    /// `None` when the key did not exist then, and also when interception
    /// was disabled at some point between `at` and the end of the found
    /// image's interval: a write inside that gap left no history, so the
    /// image may not be the one that was current at `at`.
    pub fn as_of(&self, table: &str, pk: &FieldValue, at: Timestamp) -> Result<Option<Row>, EngineError> {
        let (row, valid) = match self.edition_time(table, pk)? {
            Some(since) if since <= at => match self.get(table, pk)? {
                Some(row) => (row, Interval::open(since)),
                None => return Ok(None),
            },
            _ => {
                let hist = self.entry(table)?.history_schema()?;
                match history::image_at(self.storage.conn(), &hist, pk, at)? {
                    Some(h) => (h.row, h.sys_period),
                    None => return Ok(None),
                }
            }
        };
        let since_at = match valid.end() {
            Some(end) => Interval::closed(at, end)?,
            None => Interval::open(at),
        };
        let gaps = gaps::for_table(self.storage.conn(), table)?;
        if let Some(gap) = gaps.iter().find(|g| g.overlaps(&since_at)) {
            debug!(table, gap = %gap, "as_of crosses an interception gap");
            return Ok(None);
        }
        Ok(Some(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempora_core::{schema::ColumnType, TableSchema};

    fn engine_with_class() -> Engine {
        let mut engine = Engine::open_in_memory().unwrap();
        let schema = TableSchema::builder("class")
            .with_edition_time()
            .column("class_name", ColumnType::Text)
            .build(63)
            .unwrap();
        engine.create_table(&schema).unwrap();
        engine
    }

    fn class_row(name: &str) -> Row {
        let mut row = Row::new();
        row.insert("class_name".into(), name.into());
        row
    }

    #[test]
    fn transaction_timestamps_increase() {
        let mut engine = engine_with_class();
        let (_, first) = engine.insert("class", class_row("a")).unwrap();
        let (_, second) = engine.insert("class", class_row("b")).unwrap();
        assert!(second.at > first.at);
        assert_eq!(high_water_mark(engine.storage().conn()).unwrap(), Some(second.at));
    }

    #[test]
    fn insert_defaults_time_columns_to_transaction_time() {
        let mut engine = engine_with_class();
        let (pk, outcome) = engine.insert("class", class_row("a")).unwrap();
        let row = engine.get("class", &pk).unwrap().unwrap();
        assert_eq!(row[CREATION_TIME], FieldValue::Timestamp(outcome.at));
        assert_eq!(row[EDITION_TIME], FieldValue::Timestamp(outcome.at));
        assert_eq!(outcome.archived, 0);
    }

    #[test]
    fn as_of_refuses_to_reconstruct_across_a_disabled_gap() {
        let mut engine = engine_with_class();
        let (pk, created) = engine.insert("class", class_row("v1")).unwrap();
        engine.disable().unwrap();
        engine.update("class", &pk, class_row("v2")).unwrap();
        engine.enable().unwrap();

        let then = Timestamp::new(created.at.wall_ms(), created.at.counter() + 1);
        assert_eq!(engine.as_of("class", &pk, then).unwrap(), None);
        assert_eq!(engine.as_of("class", &pk, created.at).unwrap(), None);

        let renamed = engine.update("class", &pk, class_row("v3")).unwrap();
        let now = engine.as_of("class", &pk, renamed.at).unwrap().unwrap();
        assert_eq!(now["class_name"], FieldValue::Text("v3".into()));
    }

    #[test]
    fn as_of_walks_back_through_history() {
        let mut engine = engine_with_class();
        let (pk, created) = engine.insert("class", class_row("a")).unwrap();
        let renamed = engine.update("class", &pk, class_row("b")).unwrap();

        let then = engine.as_of("class", &pk, created.at).unwrap().unwrap();
        assert_eq!(then["class_name"], FieldValue::Text("a".into()));
        let now = engine.as_of("class", &pk, renamed.at).unwrap().unwrap();
        assert_eq!(now["class_name"], FieldValue::Text("b".into()));
        let before = Timestamp::new(created.at.wall_ms() - 1, 0);
        assert_eq!(engine.as_of("class", &pk, before).unwrap(), None);
    }

    #[test]
    fn failed_batch_leaves_nothing_behind() {
        let mut engine = engine_with_class();
        let (pk, _) = engine.insert("class", class_row("a")).unwrap();

        let result = engine.batch(|w| {
            w.update("class", &pk, class_row("b"))?;
            w.delete("class", &FieldValue::Integer(999))
        });
        assert!(result.unwrap_err().is_row_not_found());
        assert_eq!(engine.get("class", &pk).unwrap().unwrap()["class_name"], FieldValue::Text("a".into()));
        assert!(engine.history_rows("class").unwrap().is_empty());
    }

    #[test]
    fn writes_to_unregistered_tables_are_refused() {
        let mut engine = Engine::open_in_memory().unwrap();
        let err = engine.insert("nowhere", class_row("a")).unwrap_err();
        assert!(err.is_not_registered());
    }
}
