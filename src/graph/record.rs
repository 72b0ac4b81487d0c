//! Typed record decoding. Every query result is read through one
//! [`FromRecord`] implementation that resolves columns by name.

use rusqlite::{Connection, OptionalExtension, Params, Row};

use super::StoreError;

/// Decode one result row into a typed record.
///
/// Implementations read columns by name; a missing column or a type mismatch
/// surfaces as [`StoreError::Malformed`] through the `From<rusqlite::Error>`
/// conversion.
pub trait FromRecord: Sized {
    fn from_record(row: &Row<'_>) -> rusqlite::Result<Self>;
}

/// Run `sql` and decode every row.
pub fn query_all<T, P>(conn: &Connection, sql: &str, params: P) -> Result<Vec<T>, StoreError>
where
    T: FromRecord,
    P: Params,
{
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt.query_map(params, |row| T::from_record(row))?;
    let records = rows.collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

/// Run `sql` and decode the first row, if any. No match is `Ok(None)`.
pub fn query_opt<T, P>(conn: &Connection, sql: &str, params: P) -> Result<Option<T>, StoreError>
where
    T: FromRecord,
    P: Params,
{
    let mut stmt = conn.prepare_cached(sql)?;
    let record = stmt.query_row(params, |row| T::from_record(row)).optional()?;
    Ok(record)
}

/// Single-column string projection, e.g. `SELECT id FROM …`.
pub struct Id(pub String);

impl FromRecord for Id {
    fn from_record(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Id(row.get("id")?))
    }
}
