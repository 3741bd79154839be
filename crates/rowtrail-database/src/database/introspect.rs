//! Live catalog introspection and row decoding.
//!
//! Schema is read on the caller's connection at invocation time, so a table
//! altered earlier in the same transaction is seen with its new columns.

use rowtrail_capture::{Catalog, ColumnDef, TableSchema};
use rowtrail_types::{RowImage, TableIdentity, Value};
use sqlx::error::BoxDynError;
use sqlx::sqlite::{SqliteConnection, SqliteRow, SqliteValueRef};
use sqlx::{Column, Decode, Row, Sqlite, TypeInfo, ValueRef};
use thiserror::Error;
use tracing::trace;

/// A column value that could not be decoded.
#[derive(Debug, Error)]
#[error("failed to decode column {column}: {source}")]
pub struct DecodeError {
    pub column: String,
    #[source]
    pub source: BoxDynError,
}

/// Reads table metadata through `pragma_table_info`.
pub struct SqliteCatalog;

impl SqliteCatalog {
    /// Columns and primary key of `table`, or `None` if it does not exist.
    ///
    /// Tables relying on the implicit rowid report no primary key.
    pub async fn table_schema(
        conn: &mut SqliteConnection,
        table: &TableIdentity,
    ) -> Result<Option<TableSchema>, sqlx::Error> {
        let rows = sqlx::query("SELECT name, pk FROM pragma_table_info(?1, ?2) ORDER BY cid")
            .bind(&table.table)
            .bind(&table.schema)
            .fetch_all(&mut *conn)
            .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        let columns = rows
            .iter()
            .map(|row| {
                let pk: i64 = row.try_get("pk")?;
                Ok(ColumnDef {
                    name: row.try_get("name")?,
                    primary_key_position: u32::try_from(pk).ok().filter(|pos| *pos > 0),
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        trace!(%table, columns = columns.len(), "loaded table schema");
        Ok(Some(TableSchema::from_columns(columns)))
    }

    /// A catalog holding `table` if it exists, empty otherwise.
    pub async fn snapshot(
        conn: &mut SqliteConnection,
        table: &TableIdentity,
    ) -> Result<Catalog, sqlx::Error> {
        let mut catalog = Catalog::new();
        if let Some(schema) = Self::table_schema(conn, table).await? {
            catalog.define(table.clone(), schema);
        }
        Ok(catalog)
    }
}

fn decode<'r, T: Decode<'r, Sqlite>>(
    column: &str,
    value: SqliteValueRef<'r>,
) -> Result<T, DecodeError> {
    T::decode(value).map_err(|source| DecodeError {
        column: column.to_string(),
        source,
    })
}

/// Decode a result row into a row image by storage class.
///
/// Values keep the class SQLite stored them with: booleans come back as
/// integers and timestamps as text.
pub fn row_image(row: &SqliteRow) -> Result<RowImage, DecodeError> {
    let mut image = RowImage::new();

    for column in row.columns() {
        let name = column.name();
        let raw = row.try_get_raw(column.ordinal()).map_err(|e| DecodeError {
            column: name.to_string(),
            source: Box::new(e),
        })?;

        let value = if raw.is_null() {
            Value::Null
        } else {
            let storage = raw.type_info().name().to_string();
            match storage.as_str() {
                "INTEGER" => Value::Integer(decode(name, raw)?),
                "REAL" => Value::Real(decode(name, raw)?),
                "BLOB" => Value::Blob(decode(name, raw)?),
                _ => Value::Text(decode(name, raw)?),
            }
        };
        image.insert(name, value);
    }

    Ok(image)
}
