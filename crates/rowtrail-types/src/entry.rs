//! Persisted audit entries.

use crate::{ActorContext, AuditMode, Operation, TableIdentity, TransactionMarker, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fields common to both entry shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryHeader {
    /// When the mutation's transaction started.
    pub timestamp: DateTime<Utc>,
    /// Transaction the mutation belongs to.
    pub transaction: TransactionMarker,
    /// Who issued the mutation.
    pub actor: ActorContext,
    /// Mutation kind.
    pub operation: Operation,
    /// Mutated table.
    pub table: TableIdentity,
}

/// One changed (or, for insert/delete, present) column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnAuditEntry {
    #[serde(flatten)]
    pub header: EntryHeader,
    /// Encoded record identity.
    pub record_id: String,
    /// Column name.
    pub column: String,
    /// Value before the mutation, `None` when absent or NULL.
    pub old_value: Option<Value>,
    /// Value after the mutation, `None` when absent or NULL.
    pub new_value: Option<Value>,
}

/// One mutation with filtered before/after row images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowAuditEntry {
    #[serde(flatten)]
    pub header: EntryHeader,
    /// Encoded record identity.
    pub record_id: String,
    /// Structured record identity, key column to value.
    pub record: serde_json::Value,
    /// Row before the mutation without skipped columns; `None` on insert.
    pub old_row: Option<serde_json::Value>,
    /// Row after the mutation without skipped columns; `None` on delete.
    pub new_row: Option<serde_json::Value>,
}

/// An append-only audit entry in either shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "grain", rename_all = "snake_case")]
pub enum AuditEntry {
    /// Column-grained entry.
    Column(ColumnAuditEntry),
    /// Row-grained entry.
    Row(RowAuditEntry),
}

impl AuditEntry {
    /// The shared header.
    pub fn header(&self) -> &EntryHeader {
        match self {
            Self::Column(entry) => &entry.header,
            Self::Row(entry) => &entry.header,
        }
    }

    /// Encoded record identity.
    pub fn record_id(&self) -> &str {
        match self {
            Self::Column(entry) => &entry.record_id,
            Self::Row(entry) => &entry.record_id,
        }
    }

    /// Which shape this entry has.
    pub fn mode(&self) -> AuditMode {
        match self {
            Self::Column(_) => AuditMode::ColumnGrained,
            Self::Row(_) => AuditMode::RowGrained,
        }
    }

    /// The column-grained entry, if this is one.
    pub fn as_column(&self) -> Option<&ColumnAuditEntry> {
        match self {
            Self::Column(entry) => Some(entry),
            Self::Row(_) => None,
        }
    }

    /// The row-grained entry, if this is one.
    pub fn as_row(&self) -> Option<&RowAuditEntry> {
        match self {
            Self::Row(entry) => Some(entry),
            Self::Column(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TransactionContext;
    use serde_json::json;

    fn header() -> EntryHeader {
        let txn = TransactionContext::begin();
        EntryHeader {
            timestamp: txn.started_at,
            transaction: txn.marker,
            actor: ActorContext::new("alice"),
            operation: Operation::Update,
            table: TableIdentity::unqualified("users"),
        }
    }

    #[test]
    fn test_column_entry_json_shape() {
        let entry = AuditEntry::Column(ColumnAuditEntry {
            header: header(),
            record_id: "1".into(),
            column: "name".into(),
            old_value: Some(Value::from("a")),
            new_value: Some(Value::from("b")),
        });

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["grain"], "column");
        assert_eq!(json["operation"], "UPDATE");
        assert_eq!(json["table"], json!({"schema": "main", "table": "users"}));
        assert_eq!(json["column"], "name");
        assert_eq!(entry.mode(), AuditMode::ColumnGrained);

        let back: AuditEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_row_entry_accessors() {
        let entry = AuditEntry::Row(RowAuditEntry {
            header: header(),
            record_id: "1".into(),
            record: json!({"id": 1}),
            old_row: Some(json!({"name": "a"})),
            new_row: Some(json!({"name": "b"})),
        });

        assert_eq!(entry.record_id(), "1");
        assert_eq!(entry.mode(), AuditMode::RowGrained);
        assert!(entry.as_column().is_none());
        assert_eq!(entry.as_row().unwrap().new_row, Some(json!({"name": "b"})));
        assert_eq!(entry.header().actor.actor.as_deref(), Some("alice"));
    }
}
