//! SQLite hosting integration for Rowtrail.
//!
//! Provides the transactional scope the capture engine runs in: a pooled
//! SQLite database, the built-in append-only audit tables, live catalog
//! introspection and [`AuditedTransaction`], which enlists a mutation and
//! its audit entries in one `sqlx` transaction.

pub mod database;

pub use database::*;
