use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("migration {version} failed: {source}")]
    ExecutionFailed {
        version: i64,
        #[source]
        source: sqlx::Error,
    },

    #[error("migration {version} changed after it was applied: {found} != {expected}")]
    ChecksumMismatch {
        version: i64,
        expected: String,
        found: String,
    },

    #[error("migration {0} is applied but unknown to this build")]
    UnknownApplied(i64),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// One schema step, identified by version and pinned by the SHA-256 of its SQL.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub name: String,
    /// May hold several statements.
    pub up_sql: String,
    /// Lowercase hex SHA-256 of `up_sql`.
    pub checksum: String,
}

impl Migration {
    pub fn new(version: i64, name: impl Into<String>, up_sql: impl Into<String>) -> Self {
        let up_sql = up_sql.into();
        Self {
            version,
            name: name.into(),
            checksum: Self::compute_checksum(&up_sql),
            up_sql,
        }
    }

    pub fn compute_checksum(sql: &str) -> String {
        format!("{:x}", Sha256::digest(sql.as_bytes()))
    }

    /// Whether `checksum` still matches `up_sql`.
    pub fn verify_checksum(&self) -> bool {
        self.checksum == Self::compute_checksum(&self.up_sql)
    }
}

/// A row of the migration tracking table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AppliedMigration {
    pub version: i64,
    pub name: String,
    pub checksum: String,
    pub applied_at: DateTime<Utc>,
    pub execution_time_ms: i64,
}

/// Outcome of applying one migration.
#[derive(Debug, Clone)]
pub struct MigrationResult {
    pub version: i64,
    pub name: String,
    pub execution_time_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_is_stable_sha256() {
        let migration = Migration::new(1, "noop", "SELECT 1");
        assert_eq!(migration.checksum.len(), 64);
        assert!(migration.verify_checksum());
        assert_eq!(migration.checksum, Migration::compute_checksum("SELECT 1"));
        assert_ne!(migration.checksum, Migration::compute_checksum("SELECT 2"));
    }
}
