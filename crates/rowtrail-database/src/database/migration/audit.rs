//! Built-in audit table migrations.
//!
//! Both audit tables are guarded by triggers that abort any UPDATE or
//! DELETE, so stored entries can only be appended and read.

use super::types::Migration;

/// Table holding column-grained entries.
pub const COLUMN_LOG_TABLE: &str = "audit_column_log";

/// Table holding row-grained entries.
pub const ROW_LOG_TABLE: &str = "audit_row_log";

/// Message raised when an audit row is updated or deleted.
pub const APPEND_ONLY_MESSAGE: &str = "audit entries are append-only";

const COLUMN_LOG_SQL: &str = r#"
CREATE TABLE audit_column_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    logged_at DATETIME NOT NULL,
    transaction_id TEXT NOT NULL,
    actor TEXT,
    client_addr TEXT,
    operation TEXT NOT NULL CHECK (operation IN ('INSERT', 'UPDATE', 'DELETE')),
    schema_name TEXT NOT NULL,
    table_name TEXT NOT NULL,
    record_id TEXT NOT NULL,
    column_name TEXT NOT NULL,
    old_value TEXT,
    new_value TEXT
);

CREATE INDEX idx_audit_column_log_record
    ON audit_column_log (schema_name, table_name, record_id);

CREATE INDEX idx_audit_column_log_transaction
    ON audit_column_log (transaction_id);

CREATE TRIGGER audit_column_log_no_update
BEFORE UPDATE ON audit_column_log
BEGIN
    SELECT RAISE(ABORT, 'audit entries are append-only');
END;

CREATE TRIGGER audit_column_log_no_delete
BEFORE DELETE ON audit_column_log
BEGIN
    SELECT RAISE(ABORT, 'audit entries are append-only');
END;
"#;

const ROW_LOG_SQL: &str = r#"
CREATE TABLE audit_row_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    logged_at DATETIME NOT NULL,
    transaction_id TEXT NOT NULL,
    actor TEXT,
    client_addr TEXT,
    operation TEXT NOT NULL CHECK (operation IN ('INSERT', 'UPDATE', 'DELETE')),
    schema_name TEXT NOT NULL,
    table_name TEXT NOT NULL,
    record_id TEXT NOT NULL,
    record TEXT NOT NULL CHECK (json_valid(record)),
    old_row TEXT CHECK (old_row IS NULL OR json_valid(old_row)),
    new_row TEXT CHECK (new_row IS NULL OR json_valid(new_row))
);

CREATE INDEX idx_audit_row_log_record
    ON audit_row_log (schema_name, table_name, record_id);

CREATE INDEX idx_audit_row_log_transaction
    ON audit_row_log (transaction_id);

CREATE TRIGGER audit_row_log_no_update
BEFORE UPDATE ON audit_row_log
BEGIN
    SELECT RAISE(ABORT, 'audit entries are append-only');
END;

CREATE TRIGGER audit_row_log_no_delete
BEFORE DELETE ON audit_row_log
BEGIN
    SELECT RAISE(ABORT, 'audit entries are append-only');
END;
"#;

/// Migrations creating both audit tables, in version order.
pub fn audit_migrations() -> Vec<Migration> {
    vec![
        Migration::new(1, "create_audit_column_log", COLUMN_LOG_SQL),
        Migration::new(2, "create_audit_row_log", ROW_LOG_SQL),
    ]
}
