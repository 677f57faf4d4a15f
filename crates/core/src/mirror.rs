//! Derives history and tracking table layouts from a live table schema.
//!
//! Derivation is pure: the same live schema always yields the same derived
//! schemas, so a derived table can be dropped and recreated from the
//! catalog's copy of the live schema.

use crate::ident::{history_table_name, tracking_table_name, Identifier};
use crate::schema::{ColumnDef, ColumnType, TableSchema, EDITION_TIME, SYS_PERIOD};
use crate::CoreError;

pub const TRACKING_PK: &str = "live_pk";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistorySchema {
    pub table: Identifier,
    pub live_table: Identifier,
    /// Live columns in live order, followed by `sys_period`.
    pub columns: Vec<ColumnDef>,
    /// Name of the live primary key column, indexed but not unique here.
    pub key_column: Identifier,
}

impl HistorySchema {
    /// Columns copied verbatim from the live row.
    pub fn live_columns(&self) -> &[ColumnDef] {
        &self.columns[..self.columns.len() - 1]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingSchema {
    pub table: Identifier,
    pub live_table: Identifier,
    pub columns: Vec<ColumnDef>,
}

impl TrackingSchema {
    pub fn pk_type(&self) -> ColumnType {
        self.columns[0].ty
    }
}

pub fn history_schema(live: &TableSchema, max_identifier_len: usize) -> Result<HistorySchema, CoreError> {
    let table = history_table_name(live.name(), max_identifier_len)?;
    let mut columns: Vec<ColumnDef> = live.columns().to_vec();
    columns.push(ColumnDef {
        name: Identifier::new(SYS_PERIOD, max_identifier_len)?,
        ty: ColumnType::Interval,
        nullable: false,
    });
    Ok(HistorySchema {
        table,
        live_table: live.name().clone(),
        columns,
        key_column: live.primary_key().name.clone(),
    })
}

/// `None` for live tables that carry their own `edition_time`.
pub fn tracking_schema(
    live: &TableSchema,
    max_identifier_len: usize,
) -> Result<Option<TrackingSchema>, CoreError> {
    if live.has_edition_time() {
        return Ok(None);
    }
    let table = tracking_table_name(live.name(), max_identifier_len)?;
    Ok(Some(TrackingSchema {
        table,
        live_table: live.name().clone(),
        columns: vec![
            ColumnDef {
                name: Identifier::new(TRACKING_PK, max_identifier_len)?,
                ty: live.primary_key().ty,
                nullable: false,
            },
            ColumnDef {
                name: Identifier::new(EDITION_TIME, max_identifier_len)?,
                ty: ColumnType::Timestamp,
                nullable: false,
            },
        ],
    }))
}
