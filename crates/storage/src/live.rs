//! Row access for application-owned live tables.
//!
//! Every column name interpolated into SQL comes from a validated
//! `TableSchema`; caller-supplied row keys are checked against it first.

use rusqlite::{params_from_iter, types::Value, Connection};
use tempora_core::{
    schema::{ColumnDef, ColumnType, TableSchema},
    FieldValue, Row,
};

use crate::error::StorageError;
use crate::values::{decode_row, describe, select_list, to_sql};

fn column_ddl(col: &ColumnDef, is_pk: bool) -> String {
    let name = col.name.quoted();
    if is_pk {
        // AUTOINCREMENT keeps SQLite from handing out the key of a deleted
        // row again; history distinguishes row lifetimes by key.
        return match col.ty {
            ColumnType::Integer => format!("{name} INTEGER PRIMARY KEY AUTOINCREMENT"),
            ty => format!("{name} {} PRIMARY KEY NOT NULL", ty.sql_type()),
        };
    }
    let mut ddl = format!("{name} {}", col.ty.sql_type());
    if !col.nullable {
        ddl.push_str(" NOT NULL");
    }
    if col.ty == ColumnType::Timestamp {
        ddl.push_str(&format!(" CHECK (length({name}) = 12)"));
    }
    ddl
}

/// Creates the live table described by `schema`. Used by applications that
/// let the engine own their DDL; registration also accepts tables created
/// elsewhere.
pub fn create_live_table(conn: &Connection, schema: &TableSchema) -> Result<(), StorageError> {
    let pk = &schema.primary_key().name;
    let cols: Vec<String> = schema
        .columns()
        .iter()
        .map(|c| column_ddl(c, &c.name == pk))
        .collect();
    conn.execute_batch(&format!(
        "CREATE TABLE {} ({});",
        schema.name().quoted(),
        cols.join(", ")
    ))?;
    Ok(())
}

pub fn table_exists(conn: &Connection, name: &str) -> Result<bool, StorageError> {
    let mut stmt = conn.prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")?;
    Ok(stmt.exists([name])?)
}

/// All user tables in the database, SQLite's own excluded.
pub fn list_tables(conn: &Connection) -> Result<Vec<String>, StorageError> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

/// Column names as SQLite reports them, in table order.
pub fn observed_columns(conn: &Connection, table: &str) -> Result<Vec<String>, StorageError> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
    let cols = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(cols)
}

/// Checks every key of `row` against the schema and returns the schema
/// columns present in `row`, in schema order.
fn bound_columns<'a>(schema: &'a TableSchema, row: &Row) -> Result<Vec<&'a ColumnDef>, StorageError> {
    for (key, value) in row {
        let col = schema.column(key).ok_or_else(|| StorageError::UnknownColumn {
            table: schema.name().to_string(),
            column: key.clone(),
        })?;
        if !value.fits(col.ty) {
            return Err(StorageError::ConstraintViolation(format!(
                "{}.{} expects {}, got {}",
                schema.name(),
                key,
                col.ty.as_str(),
                describe(value)
            )));
        }
    }
    Ok(schema
        .columns()
        .iter()
        .filter(|c| row.contains_key(c.name.as_str()))
        .collect())
}

fn not_found(schema: &TableSchema, pk: &FieldValue) -> StorageError {
    StorageError::RowNotFound {
        table: schema.name().to_string(),
        key: format!("{} = {}", schema.primary_key().name, describe(pk)),
    }
}

/// Inserts `row` and returns its primary key. An absent integer key is
/// assigned by SQLite.
pub fn insert(conn: &Connection, schema: &TableSchema, row: &Row) -> Result<FieldValue, StorageError> {
    let cols = bound_columns(schema, row)?;
    let pk_name = schema.primary_key().name.as_str();
    let explicit_pk = row.get(pk_name).filter(|v| !v.is_null()).cloned();
    if explicit_pk.is_none() && schema.primary_key().ty != ColumnType::Integer {
        return Err(StorageError::ConstraintViolation(format!(
            "{}: primary key {pk_name} must be supplied",
            schema.name()
        )));
    }

    let sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES", schema.name().quoted())
    } else {
        let names: Vec<String> = cols.iter().map(|c| c.name.quoted()).collect();
        let params: Vec<String> = (1..=cols.len()).map(|i| format!("?{i}")).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            schema.name().quoted(),
            names.join(", "),
            params.join(", ")
        )
    };
    let values: Vec<Value> = cols.iter().map(|c| to_sql(&row[c.name.as_str()])).collect();
    conn.execute(&sql, params_from_iter(values))?;

    Ok(explicit_pk.unwrap_or_else(|| FieldValue::Integer(conn.last_insert_rowid())))
}

/// Overwrites the non-key columns of the row with key `pk` with `image`.
pub fn update(
    conn: &Connection,
    schema: &TableSchema,
    pk: &FieldValue,
    image: &Row,
) -> Result<(), StorageError> {
    let pk_col = &schema.primary_key().name;
    if let Some(new_pk) = image.get(pk_col.as_str())
        && new_pk != pk
    {
        return Err(StorageError::ConstraintViolation(format!(
            "{}: primary key {pk_col} is immutable",
            schema.name()
        )));
    }
    let cols: Vec<&ColumnDef> = bound_columns(schema, image)?
        .into_iter()
        .filter(|c| &c.name != pk_col)
        .collect();
    if cols.is_empty() {
        return match get(conn, schema, pk)? {
            Some(_) => Ok(()),
            None => Err(not_found(schema, pk)),
        };
    }

    let assignments: Vec<String> = cols
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = ?{}", c.name.quoted(), i + 1))
        .collect();
    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?{}",
        schema.name().quoted(),
        assignments.join(", "),
        pk_col.quoted(),
        cols.len() + 1
    );
    let mut values: Vec<Value> = cols.iter().map(|c| to_sql(&image[c.name.as_str()])).collect();
    values.push(to_sql(pk));
    let changed = conn.execute(&sql, params_from_iter(values))?;
    if changed == 0 {
        return Err(not_found(schema, pk));
    }
    Ok(())
}

pub fn delete(conn: &Connection, schema: &TableSchema, pk: &FieldValue) -> Result<(), StorageError> {
    let sql = format!(
        "DELETE FROM {} WHERE {} = ?1",
        schema.name().quoted(),
        schema.primary_key().name.quoted()
    );
    let changed = conn.execute(&sql, [to_sql(pk)])?;
    if changed == 0 {
        return Err(not_found(schema, pk));
    }
    Ok(())
}

pub fn get(conn: &Connection, schema: &TableSchema, pk: &FieldValue) -> Result<Option<Row>, StorageError> {
    let sql = format!(
        "SELECT {} FROM {} WHERE {} = ?1",
        select_list(schema.columns()),
        schema.name().quoted(),
        schema.primary_key().name.quoted()
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([to_sql(pk)])?;
    match rows.next()? {
        Some(row) => Ok(Some(decode_row(row, schema.columns())?)),
        None => Ok(None),
    }
}

/// Like [`get`], but a missing row is an error.
pub fn fetch(conn: &Connection, schema: &TableSchema, pk: &FieldValue) -> Result<Row, StorageError> {
    get(conn, schema, pk)?.ok_or_else(|| not_found(schema, pk))
}

/// Every current row, ordered by primary key.
pub fn all(conn: &Connection, schema: &TableSchema) -> Result<Vec<Row>, StorageError> {
    let sql = format!(
        "SELECT {} FROM {} ORDER BY {}",
        select_list(schema.columns()),
        schema.name().quoted(),
        schema.primary_key().name.quoted()
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(decode_row(row, schema.columns())?);
    }
    Ok(out)
}

/// Removes every row. Returns how many were removed.
pub fn clear(conn: &Connection, schema: &TableSchema) -> Result<usize, StorageError> {
    Ok(conn.execute(&format!("DELETE FROM {}", schema.name().quoted()), [])?)
}
