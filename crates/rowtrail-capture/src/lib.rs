//! Row-level change capture for Rowtrail.
//!
//! Invoked once per inserted, updated or deleted row, inside the mutating
//! transaction, the engine:
//!
//! - resolves the record identity from explicit or primary key columns
//! - enumerates the auditable columns from live schema metadata
//! - diffs the prior and new row images with NULL-aware comparison
//! - writes column-grained or row-grained entries into an [`AuditSink`]
//!
//! Any failure is returned to the caller, which must abort the mutation.

mod capture;
pub mod columns;
pub mod diff;
mod error;
pub mod identity;
mod memory;
mod registry;
pub mod schema;
mod writer;

pub use capture::{CaptureConfig, CaptureOutcome, ChangeCapture, MutationEvent};
pub use diff::{ChangeSet, ColumnChange};
pub use error::{CaptureError, Result, SinkError};
pub use identity::ResolvedIdentity;
pub use memory::{MemoryAuditLog, MemoryTransaction};
pub use registry::{AuditRegistry, TableRegistration};
pub use schema::{CachedSchema, Catalog, ColumnDef, SchemaProvider, TableSchema};
pub use writer::{AuditSink, AuditWriter};

pub use rowtrail_types::{
    ActorContext, AuditEntry, AuditMode, ColumnAuditEntry, EntryHeader, Operation,
    RecordIdentity, RowAuditEntry, RowImage, TableIdentity, TransactionContext,
    TransactionMarker, Value,
};
