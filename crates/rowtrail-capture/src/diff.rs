//! Change set computation.
//!
//! A [`ChangeSet`] holds both renditions of a mutation: the per-column
//! changes used for column-grained entries, and the filtered before/after
//! images used for row-grained entries. Both are restricted to the eligible
//! columns, so diffing the images reproduces the per-column changes.

use rowtrail_types::{Operation, RowImage, Value};
use serde::Serialize;
use std::collections::BTreeSet;

/// One column's difference. NULL is represented as `None`, so an entry never
/// carries a `Some(Value::Null)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnChange {
    pub column: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

/// Differences between the prior and new images of one mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeSet {
    operation: Operation,
    changes: Vec<ColumnChange>,
    old_image: Option<RowImage>,
    new_image: Option<RowImage>,
}

impl ChangeSet {
    /// Mutation kind the change set describes.
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Per-column changes, sorted by column name.
    pub fn changes(&self) -> &[ColumnChange] {
        &self.changes
    }

    /// Names of the changed columns.
    pub fn changed_columns(&self) -> impl Iterator<Item = &str> {
        self.changes.iter().map(|c| c.column.as_str())
    }

    /// Prior image restricted to eligible columns; `None` on insert.
    pub fn old_image(&self) -> Option<&RowImage> {
        self.old_image.as_ref()
    }

    /// New image restricted to eligible columns; `None` on delete.
    pub fn new_image(&self) -> Option<&RowImage> {
        self.new_image.as_ref()
    }

    /// True if nothing auditable changed.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of changed columns.
    pub fn len(&self) -> usize {
        self.changes.len()
    }
}

fn non_null(value: &Value) -> Option<Value> {
    (!value.is_null()).then(|| value.clone())
}

/// Compute the change set of a mutation over `eligible` columns.
///
/// - insert: every eligible column with a non-NULL new value
/// - delete: every eligible column with a non-NULL prior value
/// - update: every eligible column whose values are distinct, NULL-aware
///
/// A missing image is read as all-NULL; callers validate image presence
/// before diffing.
pub fn diff(
    operation: Operation,
    eligible: &BTreeSet<String>,
    prior: Option<&RowImage>,
    new: Option<&RowImage>,
) -> ChangeSet {
    let empty = RowImage::new();
    let prior_row = prior.unwrap_or(&empty);
    let new_row = new.unwrap_or(&empty);

    let changes = eligible
        .iter()
        .filter_map(|column| {
            let old_value = prior_row.value_of(column);
            let new_value = new_row.value_of(column);
            let changed = match operation {
                Operation::Insert => !new_value.is_null(),
                Operation::Delete => !old_value.is_null(),
                Operation::Update => old_value.is_distinct_from(new_value),
            };
            changed.then(|| ColumnChange {
                column: column.clone(),
                old_value: non_null(old_value).filter(|_| operation.has_prior_image()),
                new_value: non_null(new_value).filter(|_| operation.has_new_image()),
            })
        })
        .collect();

    ChangeSet {
        operation,
        changes,
        old_image: operation
            .has_prior_image()
            .then(|| prior_row.project(eligible)),
        new_image: operation.has_new_image().then(|| new_row.project(eligible)),
    }
}
