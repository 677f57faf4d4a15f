use tempora_core::{
    ident::Identifier,
    mirror::{self, HistorySchema, TrackingSchema},
    schema::TimeSource,
    EntryId, FieldValue, Interval, Row, TableSchema, Timestamp,
};

use crate::error::StorageError;

/// One row of `tempora_catalog`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub entry_id: EntryId,
    pub live_table: Identifier,
    pub history_table: Identifier,
    pub tracking_table: Option<Identifier>,
    pub triggers_installed: bool,
    pub schema: TableSchema,
    pub fingerprint: [u8; 32],
    pub registered_at: Timestamp,
}

impl CatalogEntry {
    pub fn time_source(&self) -> TimeSource {
        self.schema.time_source()
    }

    // Names were validated against the configured limit at registration;
    // re-deriving them here cannot fail on length.
    pub fn history_schema(&self) -> Result<HistorySchema, StorageError> {
        Ok(mirror::history_schema(&self.schema, usize::MAX)?)
    }

    pub fn tracking_schema(&self) -> Result<Option<TrackingSchema>, StorageError> {
        Ok(mirror::tracking_schema(&self.schema, usize::MAX)?)
    }

    pub fn fingerprint_hex(&self) -> String {
        self.fingerprint.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// An archived row image and the interval during which it was current.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRow {
    pub row: Row,
    pub sys_period: Interval,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingRow {
    pub live_pk: FieldValue,
    pub edition_time: Timestamp,
}
