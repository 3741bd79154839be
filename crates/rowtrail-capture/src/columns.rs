//! Auditable column enumeration.

use crate::error::Result;
use crate::schema::SchemaProvider;
use rowtrail_types::TableIdentity;
use std::collections::BTreeSet;

/// Columns excluded from value auditing: the key columns, which travel in
/// the record identity, plus any extra exclusions.
pub fn skip_set<'a>(
    key_columns: &'a [String],
    extra: impl IntoIterator<Item = &'a String>,
) -> BTreeSet<String> {
    key_columns.iter().chain(extra).cloned().collect()
}

/// Declared columns of `table` not in `skip`, sorted by name.
pub fn eligible_columns<P: SchemaProvider + ?Sized>(
    schema: &P,
    table: &TableIdentity,
    skip: &BTreeSet<String>,
) -> Result<BTreeSet<String>> {
    Ok(schema
        .declared_columns(table)?
        .into_iter()
        .filter(|column| !skip.contains(column))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CaptureError;
    use crate::schema::{Catalog, TableSchema};

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_skip_set_unions_keys_and_extras() {
        let extra = strings(&["updated_at", "id"]);
        let skip = skip_set(&strings(&["id"]), &extra);
        assert_eq!(skip.into_iter().collect::<Vec<_>>(), vec!["id", "updated_at"]);
    }

    #[test]
    fn test_excludes_skipped_columns() {
        let table = TableIdentity::unqualified("users");
        let catalog = Catalog::new().with_table(
            table.clone(),
            TableSchema::new()
                .key_column("id")
                .column("name")
                .column("email")
                .column("updated_at"),
        );
        let skip = skip_set(&strings(&["id"]), &strings(&["updated_at"]));

        let eligible = eligible_columns(&catalog, &table, &skip).unwrap();
        assert_eq!(eligible.into_iter().collect::<Vec<_>>(), vec!["email", "name"]);
    }

    #[test]
    fn test_reflects_current_schema() {
        let table = TableIdentity::unqualified("users");
        let mut catalog = Catalog::new()
            .with_table(table.clone(), TableSchema::new().key_column("id").column("name"));
        let skip = skip_set(&strings(&["id"]), &Vec::new());

        assert_eq!(eligible_columns(&catalog, &table, &skip).unwrap().len(), 1);

        catalog.define(
            table.clone(),
            TableSchema::new().key_column("id").column("name").column("email"),
        );
        assert_eq!(eligible_columns(&catalog, &table, &skip).unwrap().len(), 2);
    }

    #[test]
    fn test_unknown_table() {
        let err = eligible_columns(
            &Catalog::new(),
            &TableIdentity::unqualified("ghosts"),
            &BTreeSet::new(),
        )
        .unwrap_err();
        assert!(matches!(err, CaptureError::UnknownTable { .. }));
    }
}
