//! Audit entry encoding and persistence.

use crate::diff::ChangeSet;
use crate::error::{CaptureError, Result, SinkError};
use rowtrail_types::{
    ActorContext, AuditEntry, AuditMode, ColumnAuditEntry, EntryHeader, RecordIdentity,
    RowAuditEntry, TableIdentity, TransactionContext,
};
use tracing::warn;

/// Destination of audit entries.
///
/// A sink writes into the hosting transaction; it never commits or aborts
/// on its own.
pub trait AuditSink {
    /// Append one entry.
    fn append(&mut self, entry: AuditEntry) -> std::result::Result<(), SinkError>;
}

impl AuditSink for Vec<AuditEntry> {
    fn append(&mut self, entry: AuditEntry) -> std::result::Result<(), SinkError> {
        self.push(entry);
        Ok(())
    }
}

impl<S: AuditSink + ?Sized> AuditSink for &mut S {
    fn append(&mut self, entry: AuditEntry) -> std::result::Result<(), SinkError> {
        (**self).append(entry)
    }
}

/// Turns change sets into entries of one [`AuditMode`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditWriter {
    mode: AuditMode,
}

impl AuditWriter {
    /// Create a writer for `mode`.
    pub fn new(mode: AuditMode) -> Self {
        Self { mode }
    }

    /// Entry shape produced.
    pub fn mode(&self) -> AuditMode {
        self.mode
    }

    /// Encode a change set without writing it.
    ///
    /// An empty change set encodes to no entries in either mode.
    pub fn entries(
        &self,
        table: &TableIdentity,
        identity: &RecordIdentity,
        changes: &ChangeSet,
        actor: &ActorContext,
        transaction: &TransactionContext,
    ) -> Vec<AuditEntry> {
        if changes.is_empty() {
            return Vec::new();
        }

        let header = EntryHeader {
            timestamp: transaction.started_at,
            transaction: transaction.marker,
            actor: actor.clone(),
            operation: changes.operation(),
            table: table.clone(),
        };

        match self.mode {
            AuditMode::ColumnGrained => changes
                .changes()
                .iter()
                .map(|change| {
                    AuditEntry::Column(ColumnAuditEntry {
                        header: header.clone(),
                        record_id: identity.as_str().to_string(),
                        column: change.column.clone(),
                        old_value: change.old_value.clone(),
                        new_value: change.new_value.clone(),
                    })
                })
                .collect(),
            AuditMode::RowGrained => vec![AuditEntry::Row(RowAuditEntry {
                header,
                record_id: identity.as_str().to_string(),
                record: identity.to_json(),
                old_row: changes.old_image().map(|row| row.to_json()),
                new_row: changes.new_image().map(|row| row.to_json()),
            })],
        }
    }

    /// Encode a change set and append it to `sink`, returning the number of
    /// entries written.
    ///
    /// The first rejected append aborts the write with
    /// [`CaptureError::WriteFailure`]; entries appended before it stay in the
    /// hosting transaction, which the caller must abort.
    pub fn write<S: AuditSink + ?Sized>(
        &self,
        sink: &mut S,
        table: &TableIdentity,
        identity: &RecordIdentity,
        changes: &ChangeSet,
        actor: &ActorContext,
        transaction: &TransactionContext,
    ) -> Result<usize> {
        let entries = self.entries(table, identity, changes, actor, transaction);
        let count = entries.len();

        for entry in entries {
            sink.append(entry).map_err(|source| {
                warn!(%table, record = %identity, error = %source, "audit write rejected");
                CaptureError::WriteFailure {
                    table: table.clone(),
                    source,
                }
            })?;
        }

        Ok(count)
    }
}
