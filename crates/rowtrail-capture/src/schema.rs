//! Schema introspection seam.
//!
//! The engine never hard-codes column lists. It asks a [`SchemaProvider`] for
//! the primary key and declared columns of a table on every invocation, so
//! columns added or dropped between mutations are picked up automatically.

use crate::error::{CaptureError, Result};
use rowtrail_types::TableIdentity;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Read-only access to table metadata.
pub trait SchemaProvider {
    /// Primary key columns in key order; empty if the table has none.
    ///
    /// Fails with [`CaptureError::UnknownTable`] if the table is not known.
    fn primary_key_columns(&self, table: &TableIdentity) -> Result<Vec<String>>;

    /// All declared columns of the table.
    ///
    /// Fails with [`CaptureError::UnknownTable`] if the table is not known.
    fn declared_columns(&self, table: &TableIdentity) -> Result<Vec<String>>;
}

impl<P: SchemaProvider + ?Sized> SchemaProvider for &P {
    fn primary_key_columns(&self, table: &TableIdentity) -> Result<Vec<String>> {
        (**self).primary_key_columns(table)
    }

    fn declared_columns(&self, table: &TableIdentity) -> Result<Vec<String>> {
        (**self).declared_columns(table)
    }
}

impl<P: SchemaProvider + ?Sized> SchemaProvider for Arc<P> {
    fn primary_key_columns(&self, table: &TableIdentity) -> Result<Vec<String>> {
        (**self).primary_key_columns(table)
    }

    fn declared_columns(&self, table: &TableIdentity) -> Result<Vec<String>> {
        (**self).declared_columns(table)
    }
}

/// A declared column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// 1-based position within the primary key, if the column is part of it.
    pub primary_key_position: Option<u32>,
}

/// Column layout of one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSchema {
    columns: Vec<ColumnDef>,
}

impl TableSchema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schema from column definitions in declaration order.
    pub fn from_columns(columns: Vec<ColumnDef>) -> Self {
        Self { columns }
    }

    /// Append a non-key column.
    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.columns.push(ColumnDef {
            name: name.into(),
            primary_key_position: None,
        });
        self
    }

    /// Append a column as the next primary key member.
    pub fn key_column(mut self, name: impl Into<String>) -> Self {
        let next = self
            .columns
            .iter()
            .filter_map(|c| c.primary_key_position)
            .max()
            .unwrap_or(0)
            + 1;
        self.columns.push(ColumnDef {
            name: name.into(),
            primary_key_position: Some(next),
        });
        self
    }

    /// Primary key columns ordered by key position.
    pub fn primary_key(&self) -> Vec<String> {
        let mut keyed: Vec<_> = self
            .columns
            .iter()
            .filter_map(|c| c.primary_key_position.map(|pos| (pos, c.name.clone())))
            .collect();
        keyed.sort_by_key(|(pos, _)| *pos);
        keyed.into_iter().map(|(_, name)| name).collect()
    }

    /// Declared column names in declaration order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Whether the table declares `name`.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }
}

/// In-memory catalog of table schemas.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: HashMap<TableIdentity, TableSchema>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Define or replace a table.
    pub fn define(&mut self, table: TableIdentity, schema: TableSchema) {
        self.tables.insert(table, schema);
    }

    /// Builder-style [`Catalog::define`].
    pub fn with_table(mut self, table: TableIdentity, schema: TableSchema) -> Self {
        self.define(table, schema);
        self
    }

    /// Remove a table.
    pub fn drop_table(&mut self, table: &TableIdentity) -> Option<TableSchema> {
        self.tables.remove(table)
    }

    /// Schema of a table.
    pub fn get(&self, table: &TableIdentity) -> Option<&TableSchema> {
        self.tables.get(table)
    }

    fn require(&self, table: &TableIdentity) -> Result<&TableSchema> {
        self.tables.get(table).ok_or_else(|| CaptureError::UnknownTable {
            table: table.clone(),
        })
    }
}

impl SchemaProvider for Catalog {
    fn primary_key_columns(&self, table: &TableIdentity) -> Result<Vec<String>> {
        Ok(self.require(table)?.primary_key())
    }

    fn declared_columns(&self, table: &TableIdentity) -> Result<Vec<String>> {
        Ok(self.require(table)?.column_names())
    }
}

#[derive(Debug)]
struct CachedTable {
    primary_key: Vec<String>,
    columns: Vec<String>,
}

/// Memoises another provider per table until invalidated.
///
/// Hosts must call [`CachedSchema::invalidate`] when they observe a schema
/// change, otherwise mutations keep seeing the old column set.
#[derive(Debug)]
pub struct CachedSchema<P> {
    inner: P,
    cache: RwLock<HashMap<TableIdentity, Arc<CachedTable>>>,
}

impl<P: SchemaProvider> CachedSchema<P> {
    /// Wrap a provider.
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// The wrapped provider.
    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Drop the cached metadata of one table.
    pub fn invalidate(&self, table: &TableIdentity) {
        let removed = self
            .cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(table)
            .is_some();
        if removed {
            debug!(%table, "schema cache invalidated");
        }
    }

    /// Drop all cached metadata.
    pub fn invalidate_all(&self) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of tables currently cached.
    pub fn cached_tables(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn fetch(&self, table: &TableIdentity) -> Result<Arc<CachedTable>> {
        if let Some(hit) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(table)
        {
            return Ok(hit.clone());
        }

        let loaded = Arc::new(CachedTable {
            primary_key: self.inner.primary_key_columns(table)?,
            columns: self.inner.declared_columns(table)?,
        });
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(table.clone(), loaded.clone());
        Ok(loaded)
    }
}

impl<P: SchemaProvider> SchemaProvider for CachedSchema<P> {
    fn primary_key_columns(&self, table: &TableIdentity) -> Result<Vec<String>> {
        Ok(self.fetch(table)?.primary_key.clone())
    }

    fn declared_columns(&self, table: &TableIdentity) -> Result<Vec<String>> {
        Ok(self.fetch(table)?.columns.clone())
    }
}
