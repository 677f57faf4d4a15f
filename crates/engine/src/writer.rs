use rusqlite::Transaction;
use tempora_core::{
    schema::{CREATION_TIME, EDITION_TIME},
    CoreError, FieldValue, Row, Timestamp, TrackingSchema, TxId,
};
use tempora_storage::{catalog, history, live, tracking, CatalogEntry};
use tracing::debug;

use crate::intercept::{intercept, Action, InterceptContext, PriorImage, RowEvent};
use crate::EngineError;

/// What a committed write transaction did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationOutcome {
    pub tx_id: TxId,
    /// The transaction timestamp: every edition time and interval bound
    /// written by the transaction equals it.
    pub at: Timestamp,
    /// History rows appended.
    pub archived: usize,
}

/// Live-table writes inside one IMMEDIATE transaction. Interception effects
/// are applied alongside each write, so a failure anywhere rolls back the
/// live change together with its history.
///
/// Dropping a `Writer` without [`Writer::commit`] rolls back.
pub struct Writer<'e> {
    tx: Transaction<'e>,
    tx_id: TxId,
    now: Timestamp,
    archived: usize,
}

impl<'e> Writer<'e> {
    pub(crate) fn new(tx: Transaction<'e>, now: Timestamp) -> Self {
        Self {
            tx,
            tx_id: TxId::new(),
            now,
            archived: 0,
        }
    }

    pub fn tx_id(&self) -> TxId {
        self.tx_id
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// Inserts `row` into a registered table and returns its key. Missing
    /// `creation_time` (and `edition_time`, where the table has one) default
    /// to the transaction timestamp.
    pub fn insert(&mut self, table: &str, mut row: Row) -> Result<FieldValue, EngineError> {
        let entry = catalog::get(&self.tx, table)?;
        let schema = &entry.schema;
        fill_default(&mut row, CREATION_TIME, self.now);
        if schema.has_edition_time() {
            fill_default(&mut row, EDITION_TIME, self.now);
        }
        let pk = live::insert(&self.tx, schema, &row)?;

        if entry.triggers_installed {
            row.insert(schema.primary_key().name.as_str().to_owned(), pk.clone());
            let actions = intercept(&self.context(&entry), &RowEvent::Insert { new: &row })?;
            self.apply(&entry, actions)?;
        }
        Ok(pk)
    }

    /// Applies `changes` on top of the current image of `pk`.
    pub fn update(&mut self, table: &str, pk: &FieldValue, changes: Row) -> Result<(), EngineError> {
        let entry = catalog::get(&self.tx, table)?;
        let schema = &entry.schema;
        let old = live::fetch(&self.tx, schema, pk)?;
        let mut new = old.clone();
        new.extend(changes);

        if !entry.triggers_installed {
            live::update(&self.tx, schema, pk, &new)?;
            return Ok(());
        }
        let tracked = self.tracked_time(&entry, pk)?;
        let actions = intercept(
            &self.context(&entry),
            &RowEvent::Update {
                old: PriorImage { row: &old, tracked },
            },
        )?;
        for action in &actions {
            if let Action::StampEditionTime(at) = action {
                new.insert(EDITION_TIME.to_owned(), (*at).into());
            }
        }
        live::update(&self.tx, schema, pk, &new)?;
        self.apply(&entry, actions)
    }

    pub fn delete(&mut self, table: &str, pk: &FieldValue) -> Result<(), EngineError> {
        let entry = catalog::get(&self.tx, table)?;
        let old = live::fetch(&self.tx, &entry.schema, pk)?;

        if !entry.triggers_installed {
            live::delete(&self.tx, &entry.schema, pk)?;
            return Ok(());
        }
        let tracked = self.tracked_time(&entry, pk)?;
        let actions = intercept(
            &self.context(&entry),
            &RowEvent::Delete {
                old: PriorImage { row: &old, tracked },
            },
        )?;
        live::delete(&self.tx, &entry.schema, pk)?;
        self.apply(&entry, actions)
    }

    /// Removes every row of `table`, archiving each one. Returns the number
    /// of rows removed.
    pub fn truncate(&mut self, table: &str) -> Result<usize, EngineError> {
        let entry = catalog::get(&self.tx, table)?;
        if !entry.triggers_installed {
            return Ok(live::clear(&self.tx, &entry.schema)?);
        }

        let rows = live::all(&self.tx, &entry.schema)?;
        let pk_col = entry.schema.primary_key().name.as_str();
        let mut tracked = Vec::with_capacity(rows.len());
        for row in &rows {
            let time = match row.get(pk_col) {
                Some(pk) => self.tracked_time(&entry, pk)?,
                None => None,
            };
            tracked.push(time);
        }
        let images = rows
            .iter()
            .zip(tracked)
            .map(|(row, tracked)| PriorImage { row, tracked })
            .collect();
        let actions = intercept(&self.context(&entry), &RowEvent::Truncate { rows: images })?;
        let removed = live::clear(&self.tx, &entry.schema)?;
        self.apply(&entry, actions)?;
        Ok(removed)
    }

    /// Reads a live row as this transaction sees it.
    pub fn get(&self, table: &str, pk: &FieldValue) -> Result<Option<Row>, EngineError> {
        let entry = catalog::get(&self.tx, table)?;
        Ok(live::get(&self.tx, &entry.schema, pk)?)
    }

    pub fn commit(self) -> Result<MutationOutcome, EngineError> {
        crate::commit(self.tx)?;
        Ok(MutationOutcome {
            tx_id: self.tx_id,
            at: self.now,
            archived: self.archived,
        })
    }

    fn context<'a>(&self, entry: &'a CatalogEntry) -> InterceptContext<'a> {
        InterceptContext {
            time_source: entry.time_source(),
            primary_key: entry.schema.primary_key().name.as_str(),
            now: self.now,
        }
    }

    fn tracked_time(&self, entry: &CatalogEntry, pk: &FieldValue) -> Result<Option<Timestamp>, EngineError> {
        match entry.tracking_schema()? {
            Some(t) => Ok(tracking::edition_time_of(&self.tx, &t, pk)?),
            None => Ok(None),
        }
    }

    fn apply(&mut self, entry: &CatalogEntry, actions: Vec<Action>) -> Result<(), EngineError> {
        let hist = entry.history_schema()?;
        let shadow = entry.tracking_schema()?;
        let mut archived = 0;
        for action in actions {
            match action {
                Action::Archive { row, period } => {
                    history::archive(&self.tx, &hist, &row, period)?;
                    archived += 1;
                }
                // Already part of the image written to the live table.
                Action::StampEditionTime(_) => {}
                Action::TouchTracking { pk, edition_time } => {
                    tracking::touch(&self.tx, require_tracking(entry, &shadow)?, &pk, edition_time)?;
                }
                Action::RemoveTracking { pk } => {
                    tracking::remove(&self.tx, require_tracking(entry, &shadow)?, &pk)?;
                }
                Action::ClearTracking => {
                    tracking::clear(&self.tx, require_tracking(entry, &shadow)?)?;
                }
            }
        }
        if archived > 0 {
            debug!(table = %entry.live_table, archived, at = %self.now, "archived row images");
        }
        self.archived += archived;
        Ok(())
    }
}

fn fill_default(row: &mut Row, column: &str, now: Timestamp) {
    let missing = row.get(column).is_none_or(FieldValue::is_null);
    if missing {
        row.insert(column.to_owned(), now.into());
    }
}

fn require_tracking<'a>(
    entry: &CatalogEntry,
    shadow: &'a Option<TrackingSchema>,
) -> Result<&'a TrackingSchema, EngineError> {
    shadow.as_ref().ok_or_else(|| {
        EngineError::Core(CoreError::InvalidSchema {
            table: entry.live_table.to_string(),
            reason: "table has no tracking table".into(),
        })
    })
}
