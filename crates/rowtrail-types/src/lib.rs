//! Row image, value and audit entry types for Rowtrail.
//!
//! These are the shared vocabulary of the capture engine and its storage
//! integrations:
//!
//! - [`TableIdentity`], [`RowImage`] and [`Value`] describe a mutation
//! - [`RecordIdentity`] is the collision-free encoding of a record's key
//! - [`ActorContext`] and [`TransactionContext`] are threaded through every call
//! - [`AuditEntry`] is the persisted, append-only output in either [`AuditMode`]

mod actor;
mod entry;
mod identity;
mod mode;
mod operation;
mod row;
mod table;
mod transaction;
mod value;

pub use actor::ActorContext;
pub use entry::{AuditEntry, ColumnAuditEntry, EntryHeader, RowAuditEntry};
pub use identity::{IdentityDecodeError, RecordIdentity, DELIMITER, ESCAPE, NULL_SENTINEL};
pub use mode::AuditMode;
pub use operation::Operation;
pub use row::RowImage;
pub use table::{TableIdentity, DEFAULT_SCHEMA};
pub use transaction::{TransactionContext, TransactionMarker};
pub use value::Value;
