//! History Table Manager: `<live>__history` tables and archived row images.

use rusqlite::{params_from_iter, types::Value, Connection};
use tempora_core::{
    mirror::{self, HistorySchema},
    schema::{ColumnType, SYS_PERIOD},
    FieldValue, Interval, Row, TableSchema, Timestamp,
};
use tracing::debug;

use crate::error::StorageError;
use crate::records::HistoryRow;
use crate::values::{decode_row, select_list, to_sql};

/// Derives the history layout and creates the table plus its key index.
/// The derived name is validated against `max_identifier_len` before any
/// DDL runs.
pub fn create_history(
    conn: &Connection,
    live: &TableSchema,
    max_identifier_len: usize,
) -> Result<HistorySchema, StorageError> {
    let hist = mirror::history_schema(live, max_identifier_len)?;
    let cols: Vec<String> = hist
        .columns
        .iter()
        .map(|c| {
            if c.ty == ColumnType::Interval {
                format!(
                    "{} BLOB NOT NULL CHECK (length({}) = {})",
                    c.name.quoted(),
                    c.name.quoted(),
                    Interval::ENCODED_LEN
                )
            } else {
                format!("{} {}", c.name.quoted(), c.ty.sql_type())
            }
        })
        .collect();
    conn.execute_batch(&format!(
        "CREATE TABLE {table} ({cols});
         CREATE INDEX \"{raw}_key_period\" ON {table} ({key}, \"{SYS_PERIOD}\");",
        table = hist.table.quoted(),
        raw = hist.table.as_str(),
        cols = cols.join(", "),
        key = hist.key_column.quoted(),
    ))?;
    debug!(table = %hist.table, live = %hist.live_table, "created history table");
    Ok(hist)
}

/// Drops the history table (and with it its index).
pub fn drop_history(conn: &Connection, hist: &HistorySchema) -> Result<(), StorageError> {
    conn.execute_batch(&format!("DROP TABLE IF EXISTS {};", hist.table.quoted()))?;
    debug!(table = %hist.table, "dropped history table");
    Ok(())
}

/// Appends `row` as valid during `period`. `period` must be closed.
pub fn archive(
    conn: &Connection,
    hist: &HistorySchema,
    row: &Row,
    period: Interval,
) -> Result<(), StorageError> {
    let live_cols = hist.live_columns();
    let names: Vec<String> = hist.columns.iter().map(|c| c.name.quoted()).collect();
    let params: Vec<String> = (1..=hist.columns.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        hist.table.quoted(),
        names.join(", "),
        params.join(", ")
    );
    let mut values: Vec<Value> = live_cols
        .iter()
        .map(|c| to_sql(row.get(c.name.as_str()).unwrap_or(&FieldValue::Null)))
        .collect();
    values.push(Value::Blob(period.to_bytes()?.to_vec()));
    conn.execute(&sql, params_from_iter(values))?;
    Ok(())
}

fn read_history(
    conn: &Connection,
    hist: &HistorySchema,
    filter: Option<&FieldValue>,
) -> Result<Vec<HistoryRow>, StorageError> {
    let live_cols = hist.live_columns();
    let mut sql = format!(
        "SELECT {}, \"{SYS_PERIOD}\" FROM {}",
        select_list(live_cols),
        hist.table.quoted()
    );
    if filter.is_some() {
        sql.push_str(&format!(" WHERE {} = ?1", hist.key_column.quoted()));
    }
    sql.push_str(&format!(" ORDER BY \"{SYS_PERIOD}\", {}", hist.key_column.quoted()));

    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<Value> = filter.map(to_sql).into_iter().collect();
    let mut rows = stmt.query(params_from_iter(params))?;
    let mut out = Vec::new();
    while let Some(r) = rows.next()? {
        let row = decode_row(r, live_cols)?;
        let period_bytes: Vec<u8> = r.get(live_cols.len())?;
        out.push(HistoryRow {
            row,
            sys_period: Interval::from_slice(&period_bytes)?,
        });
    }
    Ok(out)
}

/// Archived images of one live key, ordered by interval start.
pub fn history_for_key(
    conn: &Connection,
    hist: &HistorySchema,
    pk: &FieldValue,
) -> Result<Vec<HistoryRow>, StorageError> {
    read_history(conn, hist, Some(pk))
}

/// Every archived image, ordered by interval start then key.
pub fn history_rows(conn: &Connection, hist: &HistorySchema) -> Result<Vec<HistoryRow>, StorageError> {
    read_history(conn, hist, None)
}

/// The archived image of `pk` valid at `at`, if any.
pub fn image_at(
    conn: &Connection,
    hist: &HistorySchema,
    pk: &FieldValue,
    at: Timestamp,
) -> Result<Option<HistoryRow>, StorageError> {
    Ok(history_for_key(conn, hist, pk)?
        .into_iter()
        .find(|h| h.sys_period.contains(at)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SqliteStorage;
    use tempora_core::CoreError;

    fn class() -> TableSchema {
        TableSchema::builder("class")
            .with_edition_time()
            .column("class_name", ColumnType::Text)
            .build(63)
            .unwrap()
    }

    fn image(id: i64, name: &str) -> Row {
        let mut row = Row::new();
        row.insert("id".into(), FieldValue::Integer(id));
        row.insert("creation_time".into(), Timestamp::new(10, 0).into());
        row.insert("edition_time".into(), Timestamp::new(10, 0).into());
        row.insert("class_name".into(), name.into());
        row
    }

    fn period(a: u64, b: u64) -> Interval {
        Interval::closed(Timestamp::new(a, 0), Timestamp::new(b, 0)).unwrap()
    }

    #[test]
    fn history_rows_come_back_ordered_by_start() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let hist = create_history(storage.conn(), &class(), 63).unwrap();

        archive(storage.conn(), &hist, &image(1, "b"), period(20, 30)).unwrap();
        archive(storage.conn(), &hist, &image(1, "a"), period(10, 20)).unwrap();
        archive(storage.conn(), &hist, &image(2, "z"), period(15, 25)).unwrap();

        let key1 = history_for_key(storage.conn(), &hist, &FieldValue::Integer(1)).unwrap();
        assert_eq!(key1.len(), 2);
        assert_eq!(key1[0].row["class_name"], FieldValue::Text("a".into()));
        assert_eq!(key1[0].sys_period, period(10, 20));
        assert!(key1[0].sys_period.is_adjacent_to(&key1[1].sys_period));
        assert_eq!(history_rows(storage.conn(), &hist).unwrap().len(), 3);

        let at = image_at(storage.conn(), &hist, &FieldValue::Integer(1), Timestamp::new(20, 0)).unwrap();
        assert_eq!(at.unwrap().row["class_name"], FieldValue::Text("b".into()));
    }

    #[test]
    fn open_interval_is_refused() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let hist = create_history(storage.conn(), &class(), 63).unwrap();
        let err = archive(
            storage.conn(),
            &hist,
            &image(1, "a"),
            Interval::open(Timestamp::new(1, 0)),
        )
        .unwrap_err();
        assert!(matches!(err, StorageError::Core(CoreError::OpenInterval(_))));
        assert!(history_rows(storage.conn(), &hist).unwrap().is_empty());
    }

    #[test]
    fn too_long_name_creates_nothing() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let live = TableSchema::builder("a_very_very_long_table_name_which_is_pretty_close_to_63_chars")
            .build(63)
            .unwrap();
        let err = create_history(storage.conn(), &live, 63).unwrap_err();
        assert!(matches!(err, StorageError::Core(CoreError::IdentifierTooLong { .. })));
        assert!(!crate::live::table_exists(
            storage.conn(),
            "a_very_very_long_table_name_which_is_pretty_close_to_63_chars__history"
        )
        .unwrap());
    }
}
