//! Per-table audit registrations.
//!
//! A table is audited only after it has been registered. Registration is
//! validated against the schema up front so a misconfigured table fails at
//! setup rather than on its first mutation.

use crate::capture::MutationEvent;
use crate::error::{CaptureError, Result};
use crate::identity::key_columns;
use crate::schema::SchemaProvider;
use rowtrail_types::{ActorContext, Operation, RowImage, TableIdentity};
use std::collections::HashMap;
use tracing::{info, warn};

/// Audit settings attached to one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRegistration {
    pub table: TableIdentity,
    /// Key override; `None` or empty means the primary key.
    pub key_columns: Option<Vec<String>>,
    /// Columns never audited on this table.
    pub skip_columns: Vec<String>,
}

impl TableRegistration {
    /// Register `table` with its primary key and no exclusions.
    pub fn new(table: TableIdentity) -> Self {
        Self {
            table,
            key_columns: None,
            skip_columns: Vec::new(),
        }
    }

    pub fn with_key_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_skip_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip_columns.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Check the registration against the current schema.
    ///
    /// Unknown skip columns are tolerated since they may be dropped columns;
    /// unknown key columns are not.
    pub fn validate<P: SchemaProvider + ?Sized>(&self, schema: &P) -> Result<()> {
        let declared = schema.declared_columns(&self.table)?;
        let keys = key_columns(schema, &self.table, self.key_columns.as_deref())?;

        if let Some(column) = keys.iter().find(|key| !declared.contains(key)) {
            return Err(CaptureError::UnknownColumn {
                table: self.table.clone(),
                column: column.clone(),
            });
        }

        for column in self.skip_columns.iter().filter(|c| !declared.contains(c)) {
            warn!(table = %self.table, %column, "skip column is not declared");
        }
        Ok(())
    }
}

/// Registered tables keyed by identity.
#[derive(Debug, Clone, Default)]
pub struct AuditRegistry {
    tables: HashMap<TableIdentity, TableRegistration>,
}

impl AuditRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and add a registration, replacing any previous one for the
    /// same table.
    pub fn register<P: SchemaProvider + ?Sized>(
        &mut self,
        schema: &P,
        registration: TableRegistration,
    ) -> Result<()> {
        registration.validate(schema)?;
        info!(
            table = %registration.table,
            explicit_key = registration.key_columns.as_ref().is_some_and(|k| !k.is_empty()),
            skip = registration.skip_columns.len(),
            "table registered for auditing"
        );
        self.tables
            .insert(registration.table.clone(), registration);
        Ok(())
    }

    /// Stop auditing a table.
    pub fn unregister(&mut self, table: &TableIdentity) -> Option<TableRegistration> {
        self.tables.remove(table)
    }

    pub fn get(&self, table: &TableIdentity) -> Option<&TableRegistration> {
        self.tables.get(table)
    }

    pub fn is_registered(&self, table: &TableIdentity) -> bool {
        self.tables.contains_key(table)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Iterate over registrations in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &TableRegistration> {
        self.tables.values()
    }

    /// Build the event for a mutation of a registered table, carrying the
    /// table's key override and exclusions. Returns `None` for tables that
    /// are not audited.
    pub fn event(
        &self,
        table: &TableIdentity,
        operation: Operation,
        prior: Option<RowImage>,
        new: Option<RowImage>,
        actor: ActorContext,
    ) -> Option<MutationEvent> {
        let registration = self.tables.get(table)?;
        Some(MutationEvent {
            operation,
            table: table.clone(),
            prior,
            new,
            key_columns: registration.key_columns.clone(),
            skip_columns: registration.skip_columns.clone(),
            actor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Catalog, TableSchema};

    fn catalog() -> Catalog {
        Catalog::new()
            .with_table(
                TableIdentity::unqualified("users"),
                TableSchema::new().key_column("id").column("email").column("name"),
            )
            .with_table(
                TableIdentity::unqualified("events"),
                TableSchema::new().column("source").column("payload"),
            )
    }

    #[test]
    fn test_register_primary_key_table() {
        let mut registry = AuditRegistry::new();
        registry
            .register(&catalog(), TableRegistration::new(TableIdentity::unqualified("users")))
            .unwrap();
        assert!(registry.is_registered(&TableIdentity::unqualified("users")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_keyless_table_needs_explicit_key() {
        let mut registry = AuditRegistry::new();
        let events = TableIdentity::unqualified("events");

        let err = registry
            .register(&catalog(), TableRegistration::new(events.clone()))
            .unwrap_err();
        assert!(matches!(err, CaptureError::NoIdentityColumns { .. }));

        registry
            .register(
                &catalog(),
                TableRegistration::new(events.clone()).with_key_columns(["source"]),
            )
            .unwrap();
        assert!(registry.is_registered(&events));
    }

    #[test]
    fn test_undeclared_key_column_rejected() {
        let err = TableRegistration::new(TableIdentity::unqualified("users"))
            .with_key_columns(["email", "tenant"])
            .validate(&catalog())
            .unwrap_err();
        match err {
            CaptureError::UnknownColumn { column, .. } => assert_eq!(column, "tenant"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_table_rejected() {
        let err = TableRegistration::new(TableIdentity::unqualified("ghosts"))
            .validate(&catalog())
            .unwrap_err();
        assert!(matches!(err, CaptureError::UnknownTable { .. }));
    }

    #[test]
    fn test_unknown_skip_column_tolerated() {
        TableRegistration::new(TableIdentity::unqualified("users"))
            .with_skip_columns(["legacy_flag"])
            .validate(&catalog())
            .unwrap();
    }

    #[test]
    fn test_event_carries_registration_settings() {
        let mut registry = AuditRegistry::new();
        let users = TableIdentity::unqualified("users");
        registry
            .register(
                &catalog(),
                TableRegistration::new(users.clone())
                    .with_key_columns(["email"])
                    .with_skip_columns(["name"]),
            )
            .unwrap();

        let event = registry
            .event(
                &users,
                Operation::Insert,
                None,
                Some(RowImage::new().with("email", "a@b")),
                ActorContext::new("alice"),
            )
            .unwrap();
        assert_eq!(event.key_columns, Some(vec!["email".to_string()]));
        assert_eq!(event.skip_columns, vec!["name".to_string()]);

        assert!(registry
            .event(
                &TableIdentity::unqualified("events"),
                Operation::Insert,
                None,
                None,
                ActorContext::anonymous(),
            )
            .is_none());

        assert!(registry.unregister(&users).is_some());
        assert!(registry.is_empty());
    }
}
