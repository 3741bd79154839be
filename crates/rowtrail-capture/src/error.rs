//! Capture errors.
//!
//! Every error is fatal to the mutation that raised it. Nothing here is
//! retried: a mutation without its audit trail must not commit.

use rowtrail_types::{Operation, TableIdentity};
use thiserror::Error;

/// Errors raised while capturing a mutation.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("table {table} has no explicit key columns and no primary key")]
    NoIdentityColumns { table: TableIdentity },

    #[error("no schema metadata for table {table}")]
    UnknownTable { table: TableIdentity },

    #[error("key column {column} is not declared on table {table}")]
    UnknownColumn { table: TableIdentity, column: String },

    #[error("{operation} event for {table} is missing its {missing} row image")]
    InvalidEvent {
        table: TableIdentity,
        operation: Operation,
        missing: &'static str,
    },

    #[error("failed to write audit entry for {table}: {source}")]
    WriteFailure {
        table: TableIdentity,
        #[source]
        source: SinkError,
    },
}

/// Errors reported by an audit sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("audit entry rejected: {0}")]
    Rejected(String),

    #[error("audit store error: {0}")]
    Backend(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl SinkError {
    /// Wrap a storage backend error.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(err))
    }
}

/// Result type alias using [`CaptureError`].
pub type Result<T> = std::result::Result<T, CaptureError>;
