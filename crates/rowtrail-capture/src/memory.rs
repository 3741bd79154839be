//! Transactional in-memory audit log.
//!
//! Entries appended inside a [`MemoryTransaction`] become visible in the
//! [`MemoryAuditLog`] only when the transaction commits. Rolling back or
//! dropping the transaction discards them, mirroring how a hosting store
//! discards audit rows together with an aborted mutation.

use crate::error::SinkError;
use crate::writer::AuditSink;
use rowtrail_types::{AuditEntry, TransactionContext};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Shared, append-only log of committed entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditLog {
    committed: Arc<Mutex<Vec<AuditEntry>>>,
}

impl MemoryAuditLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a transaction with a fresh context.
    pub fn begin(&self) -> MemoryTransaction {
        self.begin_with(TransactionContext::begin())
    }

    /// Start a transaction with a host-supplied context.
    pub fn begin_with(&self, context: TransactionContext) -> MemoryTransaction {
        MemoryTransaction {
            log: self.clone(),
            context,
            pending: Vec::new(),
        }
    }

    /// Snapshot of committed entries in commit order.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.committed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of committed entries.
    pub fn len(&self) -> usize {
        self.committed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True if nothing has been committed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An open transaction buffering entries until commit.
#[derive(Debug)]
pub struct MemoryTransaction {
    log: MemoryAuditLog,
    context: TransactionContext,
    pending: Vec<AuditEntry>,
}

impl MemoryTransaction {
    /// Context passed to the capture engine.
    pub fn context(&self) -> &TransactionContext {
        &self.context
    }

    /// Entries appended so far.
    pub fn pending(&self) -> &[AuditEntry] {
        &self.pending
    }

    /// Publish pending entries, returning how many were committed.
    pub fn commit(mut self) -> usize {
        let count = self.pending.len();
        self.log
            .committed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(self.pending.drain(..));
        debug!(transaction = %self.context.marker, count, "audit entries committed");
        count
    }

    /// Discard pending entries.
    pub fn rollback(self) {
        debug!(
            transaction = %self.context.marker,
            count = self.pending.len(),
            "audit entries rolled back"
        );
    }
}

impl AuditSink for MemoryTransaction {
    fn append(&mut self, entry: AuditEntry) -> Result<(), SinkError> {
        self.pending.push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowtrail_types::{
        ActorContext, ColumnAuditEntry, EntryHeader, Operation, TableIdentity,
    };

    fn entry(context: &TransactionContext) -> AuditEntry {
        AuditEntry::Column(ColumnAuditEntry {
            header: EntryHeader {
                timestamp: context.started_at,
                transaction: context.marker,
                actor: ActorContext::anonymous(),
                operation: Operation::Insert,
                table: TableIdentity::unqualified("users"),
            },
            record_id: "1".into(),
            column: "name".into(),
            old_value: None,
            new_value: Some("a".into()),
        })
    }

    #[test]
    fn test_commit_publishes_entries() {
        let log = MemoryAuditLog::new();
        let mut txn = log.begin();
        let e = entry(txn.context());
        txn.append(e).unwrap();

        assert!(log.is_empty());
        assert_eq!(txn.commit(), 1);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_rollback_and_drop_discard_entries() {
        let log = MemoryAuditLog::new();

        let mut txn = log.begin();
        let e = entry(txn.context());
        txn.append(e).unwrap();
        txn.rollback();

        let mut dropped = log.begin();
        let e = entry(dropped.context());
        dropped.append(e).unwrap();
        drop(dropped);

        assert!(log.is_empty());
    }
}
