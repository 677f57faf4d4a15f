//! Live table schemas as declared by the hosting application.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ident::Identifier;
use crate::CoreError;

pub const CREATION_TIME: &str = "creation_time";
pub const EDITION_TIME: &str = "edition_time";
pub const SYS_PERIOD: &str = "sys_period";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Integer,
    Float,
    Text,
    Boolean,
    Timestamp,
    Bytes,
    /// Only produced by the schema mirror for `sys_period`.
    Interval,
}

impl ColumnType {
    /// SQLite declared type. Timestamps and intervals are stored as
    /// fixed-width big-endian blobs so that blob comparison is time order.
    pub fn sql_type(&self) -> &'static str {
        match self {
            Self::Integer | Self::Boolean => "INTEGER",
            Self::Float => "REAL",
            Self::Text => "TEXT",
            Self::Timestamp | Self::Interval | Self::Bytes => "BLOB",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::Bytes => "bytes",
            Self::Interval => "interval",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnDef {
    pub name: Identifier,
    pub ty: ColumnType,
    pub nullable: bool,
}

/// Where the last edition time of a live row is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSource {
    /// The live table carries its own `edition_time` column.
    EditionColumn,
    /// A `<live>__tracking` shadow table holds `(live_pk, edition_time)`.
    TrackingTable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    name: Identifier,
    /// Index of the primary key in `columns`.
    pk: usize,
    columns: Vec<ColumnDef>,
}

/// Catalog encoding. Decoding goes back through `from_columns`.
#[derive(Serialize, Deserialize)]
struct StoredSchema {
    name: String,
    primary_key: String,
    columns: Vec<(String, ColumnType, bool)>,
}

impl TableSchema {
    pub fn builder(name: &str) -> TableSchemaBuilder {
        TableSchemaBuilder {
            name: name.to_string(),
            primary_key: ("id".to_string(), ColumnType::Integer),
            columns: Vec::new(),
            edition_time: false,
        }
    }

    /// Validates a full column list. The primary key must be one of `columns`.
    pub fn from_columns(
        name: &str,
        primary_key: &str,
        columns: Vec<(String, ColumnType, bool)>,
        max_identifier_len: usize,
    ) -> Result<Self, CoreError> {
        let name = Identifier::new(name, max_identifier_len)?;
        let invalid = |reason: String| CoreError::InvalidSchema {
            table: name.to_string(),
            reason,
        };
        if name.is_reserved() {
            return Err(invalid("table name is reserved for derived tables".into()));
        }

        let mut seen = BTreeSet::new();
        let mut defs = Vec::with_capacity(columns.len());
        for (col, ty, nullable) in columns {
            let ident = Identifier::new(&col, max_identifier_len)?;
            if !seen.insert(col.clone()) {
                return Err(invalid(format!("duplicate column {col}")));
            }
            if col == SYS_PERIOD || ty == ColumnType::Interval {
                return Err(invalid(format!("column {col} collides with the validity interval")));
            }
            defs.push(ColumnDef {
                name: ident,
                ty,
                nullable,
            });
        }

        let pk = defs
            .iter()
            .position(|c| c.name.as_str() == primary_key)
            .ok_or_else(|| invalid(format!("primary key {primary_key} is not a column")))?;
        if defs[pk].nullable {
            return Err(invalid("primary key must not be nullable".into()));
        }
        let schema = Self {
            name: name.clone(),
            pk,
            columns: defs,
        };
        match schema.column(CREATION_TIME) {
            Some(c) if c.ty == ColumnType::Timestamp => {}
            Some(_) => return Err(invalid(format!("{CREATION_TIME} must be a timestamp"))),
            None => return Err(invalid(format!("missing {CREATION_TIME} column"))),
        }
        if let Some(c) = schema.column(EDITION_TIME)
            && c.ty != ColumnType::Timestamp
        {
            return Err(invalid(format!("{EDITION_TIME} must be a timestamp")));
        }
        Ok(schema)
    }

    pub fn name(&self) -> &Identifier {
        &self.name
    }

    pub fn primary_key(&self) -> &ColumnDef {
        &self.columns[self.pk]
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name.as_str() == name)
    }

    pub fn has_edition_time(&self) -> bool {
        self.column(EDITION_TIME).is_some()
    }

    pub fn time_source(&self) -> TimeSource {
        if self.has_edition_time() {
            TimeSource::EditionColumn
        } else {
            TimeSource::TrackingTable
        }
    }

    /// blake3 over the canonical column list. Column order matters: it is
    /// the order history rows are written in.
    pub fn fingerprint(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.name.as_str().as_bytes());
        hasher.update(b"\0pk=");
        hasher.update(self.primary_key().name.as_str().as_bytes());
        for col in &self.columns {
            hasher.update(b"\0");
            hasher.update(col.name.as_str().as_bytes());
            hasher.update(b":");
            hasher.update(col.ty.sql_type().as_bytes());
            hasher.update(if col.nullable { b"?" } else { b"!" });
        }
        *hasher.finalize().as_bytes()
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, CoreError> {
        let stored = StoredSchema {
            name: self.name.to_string(),
            primary_key: self.primary_key().name.to_string(),
            columns: self
                .columns
                .iter()
                .map(|c| (c.name.to_string(), c.ty, c.nullable))
                .collect(),
        };
        rmp_serde::to_vec(&stored).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    /// Decodes and re-validates. The identifier limit is not re-applied: it
    /// was enforced when the schema was registered.
    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, CoreError> {
        let stored: StoredSchema =
            rmp_serde::from_slice(bytes).map_err(|e| CoreError::Serialization(e.to_string()))?;
        Self::from_columns(&stored.name, &stored.primary_key, stored.columns, usize::MAX)
    }
}

pub struct TableSchemaBuilder {
    name: String,
    primary_key: (String, ColumnType),
    columns: Vec<(String, ColumnType, bool)>,
    edition_time: bool,
}

impl TableSchemaBuilder {
    pub fn primary_key(mut self, name: &str, ty: ColumnType) -> Self {
        self.primary_key = (name.to_string(), ty);
        self
    }

    pub fn column(mut self, name: &str, ty: ColumnType) -> Self {
        self.columns.push((name.to_string(), ty, false));
        self
    }

    pub fn nullable(mut self, name: &str, ty: ColumnType) -> Self {
        self.columns.push((name.to_string(), ty, true));
        self
    }

    pub fn with_edition_time(mut self) -> Self {
        self.edition_time = true;
        self
    }

    /// Lays out `pk, creation_time, [edition_time,] columns...` and validates.
    pub fn build(self, max_identifier_len: usize) -> Result<TableSchema, CoreError> {
        let (pk, pk_ty) = self.primary_key;
        let mut columns = vec![
            (pk.clone(), pk_ty, false),
            (CREATION_TIME.to_string(), ColumnType::Timestamp, false),
        ];
        if self.edition_time {
            columns.push((EDITION_TIME.to_string(), ColumnType::Timestamp, false));
        }
        columns.extend(self.columns);
        TableSchema::from_columns(&self.name, &pk, columns, max_identifier_len)
    }
}
