//! Conversions between `FieldValue` and SQLite storage values.

use rusqlite::types::{Value, ValueRef};
use tempora_core::{
    schema::{ColumnDef, ColumnType},
    FieldValue, Row, Timestamp,
};

use crate::error::StorageError;

pub(crate) fn to_sql(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Text(s) => Value::Text(s.clone()),
        FieldValue::Integer(n) => Value::Integer(*n),
        FieldValue::Float(f) => Value::Real(*f),
        FieldValue::Boolean(b) => Value::Integer(i64::from(*b)),
        FieldValue::Timestamp(t) => Value::Blob(t.to_bytes().to_vec()),
        FieldValue::Bytes(b) => Value::Blob(b.clone()),
    }
}

pub(crate) fn from_sql(value: ValueRef<'_>, ty: ColumnType, column: &str) -> Result<FieldValue, StorageError> {
    let mismatch = || {
        StorageError::Serialization(format!(
            "column {column}: stored {:?} does not decode as {}",
            value.data_type(),
            ty.as_str()
        ))
    };
    Ok(match (value, ty) {
        (ValueRef::Null, _) => FieldValue::Null,
        (ValueRef::Integer(n), ColumnType::Integer) => FieldValue::Integer(n),
        (ValueRef::Integer(n), ColumnType::Boolean) => FieldValue::Boolean(n != 0),
        (ValueRef::Integer(n), ColumnType::Float) => FieldValue::Float(n as f64),
        (ValueRef::Real(f), ColumnType::Float) => FieldValue::Float(f),
        (ValueRef::Text(t), ColumnType::Text) => FieldValue::Text(
            String::from_utf8(t.to_vec()).map_err(|e| StorageError::Serialization(e.to_string()))?,
        ),
        (ValueRef::Blob(b), ColumnType::Timestamp) => FieldValue::Timestamp(Timestamp::from_slice(b)?),
        (ValueRef::Blob(b), ColumnType::Bytes) => FieldValue::Bytes(b.to_vec()),
        _ => return Err(mismatch()),
    })
}

/// Decodes the first `columns.len()` result columns of `row` into a row image.
pub(crate) fn decode_row(row: &rusqlite::Row, columns: &[ColumnDef]) -> Result<Row, StorageError> {
    let mut out = Row::new();
    for (idx, col) in columns.iter().enumerate() {
        let value = from_sql(row.get_ref(idx)?, col.ty, col.name.as_str())?;
        out.insert(col.name.to_string(), value);
    }
    Ok(out)
}

/// Comma-separated quoted column names.
pub(crate) fn select_list(columns: &[ColumnDef]) -> String {
    columns
        .iter()
        .map(|c| c.name.quoted())
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn timestamp_from_row(row: &rusqlite::Row, idx: usize) -> Result<Timestamp, StorageError> {
    let bytes: Vec<u8> = row.get(idx)?;
    Ok(Timestamp::from_slice(&bytes)?)
}

/// Renders a key for error messages.
pub(crate) fn describe(value: &FieldValue) -> String {
    match value {
        FieldValue::Null => "NULL".into(),
        FieldValue::Text(s) => format!("{s:?}"),
        FieldValue::Integer(n) => n.to_string(),
        FieldValue::Float(f) => f.to_string(),
        FieldValue::Boolean(b) => b.to_string(),
        FieldValue::Timestamp(t) => t.to_string(),
        FieldValue::Bytes(b) => format!("<{} bytes>", b.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_and_boolean_decode_by_declared_type() {
        let ts = Timestamp::new(1_700_000_000_000, 3);
        let blob = to_sql(&FieldValue::Timestamp(ts));
        let Value::Blob(bytes) = &blob else { panic!("expected blob") };
        assert_eq!(
            from_sql(ValueRef::Blob(bytes), ColumnType::Timestamp, "t").unwrap(),
            FieldValue::Timestamp(ts)
        );
        assert_eq!(
            from_sql(ValueRef::Integer(1), ColumnType::Boolean, "b").unwrap(),
            FieldValue::Boolean(true)
        );
    }

    #[test]
    fn mismatched_storage_class_is_an_error() {
        assert!(from_sql(ValueRef::Text(b"x"), ColumnType::Integer, "n").is_err());
    }
}
