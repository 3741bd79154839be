//! Row images.

use crate::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Column values of one record at one point in time, in column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowImage {
    columns: IndexMap<String, Value>,
}

impl RowImage {
    /// Create an empty image.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column value, builder style.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    /// Set a column value, keeping the column's original position on overwrite.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns.insert(column.into(), value.into());
    }

    /// Value of a column if the image carries it.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    /// Value of a column, reading a missing column as NULL.
    pub fn value_of(&self, column: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.columns.get(column).unwrap_or(&NULL)
    }

    /// Column names in image order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Iterate `(column, value)` pairs in image order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of columns carried.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True if the image carries no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Image restricted to `columns`, in `columns` order.
    ///
    /// Columns the image does not carry are filled with NULL so both sides of
    /// an update expose the same keys.
    pub fn project(&self, columns: &BTreeSet<String>) -> RowImage {
        columns
            .iter()
            .map(|column| (column.clone(), self.value_of(column).clone()))
            .collect()
    }

    /// JSON object of the image, one member per column.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.columns
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for RowImage {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            columns: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
