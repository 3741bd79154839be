//! Record identity resolution.

use crate::error::{CaptureError, Result};
use crate::schema::SchemaProvider;
use rowtrail_types::{RecordIdentity, RowImage, TableIdentity};
use tracing::debug;

/// A record identity together with the key columns it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedIdentity {
    pub identity: RecordIdentity,
    pub key_columns: Vec<String>,
}

/// Key columns for a table: the explicit override when non-empty, otherwise
/// the primary key as currently declared.
pub fn key_columns<P: SchemaProvider + ?Sized>(
    schema: &P,
    table: &TableIdentity,
    explicit: Option<&[String]>,
) -> Result<Vec<String>> {
    if let Some(explicit) = explicit.filter(|keys| !keys.is_empty()) {
        return Ok(explicit.to_vec());
    }

    let primary_key = schema.primary_key_columns(table)?;
    if primary_key.is_empty() {
        return Err(CaptureError::NoIdentityColumns {
            table: table.clone(),
        });
    }
    Ok(primary_key)
}

/// Build the identity of the record in `row`.
///
/// A key column missing from the image is treated as NULL.
pub fn resolve<P: SchemaProvider + ?Sized>(
    schema: &P,
    table: &TableIdentity,
    explicit: Option<&[String]>,
    row: &RowImage,
) -> Result<ResolvedIdentity> {
    let key_columns = key_columns(schema, table, explicit)?;

    let key = key_columns
        .iter()
        .map(|column| {
            if row.get(column).is_none() {
                debug!(%table, %column, "key column missing from row image");
            }
            (column.clone(), row.value_of(column).clone())
        })
        .collect();

    Ok(ResolvedIdentity {
        identity: RecordIdentity::encode(key),
        key_columns,
    })
}
