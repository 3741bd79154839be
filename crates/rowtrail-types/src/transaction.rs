//! Transaction markers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier shared by every audit entry written inside one transaction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionMarker(Uuid);

impl TransactionMarker {
    /// Create a new random marker.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TransactionMarker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

impl fmt::Debug for TransactionMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionMarker({})", self)
    }
}

/// The hosting transaction an invocation runs in.
///
/// Entries take their timestamp from `started_at`, so every entry of one
/// transaction carries the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionContext {
    /// Marker written into each entry.
    pub marker: TransactionMarker,
    /// When the transaction started.
    pub started_at: DateTime<Utc>,
}

impl TransactionContext {
    /// Context for a transaction starting now.
    pub fn begin() -> Self {
        Self {
            marker: TransactionMarker::new(),
            started_at: Utc::now(),
        }
    }

    /// Context with a marker supplied by the host.
    pub fn with_marker(marker: TransactionMarker, started_at: DateTime<Utc>) -> Self {
        Self { marker, started_at }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_display() {
        let uuid = Uuid::nil();
        let marker = TransactionMarker::from_uuid(uuid);
        assert_eq!(marker.to_string(), "txn_00000000-0000-0000-0000-000000000000");
        assert_eq!(marker.as_uuid(), uuid);
    }

    #[test]
    fn test_begin_is_unique() {
        assert_ne!(TransactionContext::begin().marker, TransactionContext::begin().marker);
    }
}
