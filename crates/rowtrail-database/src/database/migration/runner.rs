use super::audit::audit_migrations;
use super::types::*;
use chrono::Utc;
use rowtrail_common_log::spans::migration_span;
use sqlx::{Executor, Row, SqlitePool};
use std::collections::BTreeMap;
use tracing::{debug, info, Instrument};

const TRACKING_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS _rowtrail_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    checksum TEXT NOT NULL,
    applied_at DATETIME NOT NULL,
    execution_time_ms INTEGER NOT NULL
)
"#;

pub struct MigrationRunner {
    pool: SqlitePool,
    migrations: BTreeMap<i64, Migration>,
}

impl MigrationRunner {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            migrations: BTreeMap::new(),
        }
    }

    /// Runner preloaded with the audit table migrations.
    pub fn with_audit_tables(pool: SqlitePool) -> Self {
        let mut runner = Self::new(pool);
        runner.add_migrations(audit_migrations());
        runner
    }

    /// Register a migration, replacing any with the same version.
    pub fn add_migration(&mut self, migration: Migration) {
        self.migrations.insert(migration.version, migration);
    }

    pub fn add_migrations(&mut self, migrations: impl IntoIterator<Item = Migration>) {
        self.migrations
            .extend(migrations.into_iter().map(|m| (m.version, m)));
    }

    /// Create `_rowtrail_migrations` if needed.
    pub async fn init(&self) -> Result<(), MigrationError> {
        sqlx::query(TRACKING_TABLE_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Highest applied version, `None` on a fresh database.
    pub async fn current_version(&self) -> Result<Option<i64>, MigrationError> {
        self.init().await?;

        let row = sqlx::query("SELECT MAX(version) AS version FROM _rowtrail_migrations")
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_get::<Option<i64>, _>("version")?)
    }

    /// Tracking rows, oldest version first.
    pub async fn applied(&self) -> Result<Vec<AppliedMigration>, MigrationError> {
        self.init().await?;

        let applied = sqlx::query_as::<_, AppliedMigration>(
            "SELECT version, name, checksum, applied_at, execution_time_ms
             FROM _rowtrail_migrations
             ORDER BY version",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(applied)
    }

    /// Known migrations above the current version.
    pub async fn pending(&self) -> Result<Vec<Migration>, MigrationError> {
        let current = self.current_version().await?.unwrap_or(0);

        Ok(self
            .migrations
            .range(current + 1..)
            .map(|(_, m)| m.clone())
            .collect())
    }

    /// Check applied migrations against the known set.
    pub async fn verify(&self) -> Result<(), MigrationError> {
        for applied in self.applied().await? {
            let known = self
                .migrations
                .get(&applied.version)
                .ok_or(MigrationError::UnknownApplied(applied.version))?;

            if known.checksum != applied.checksum {
                return Err(MigrationError::ChecksumMismatch {
                    version: applied.version,
                    expected: known.checksum.clone(),
                    found: applied.checksum,
                });
            }
        }
        Ok(())
    }

    /// Verify, then run all pending migrations.
    ///
    /// Each migration and its tracking row commit together.
    pub async fn run(&self) -> Result<Vec<MigrationResult>, MigrationError> {
        self.verify().await?;

        let pending = self.pending().await?;
        if pending.is_empty() {
            debug!("no pending migrations");
            return Ok(Vec::new());
        }

        let mut results = Vec::with_capacity(pending.len());
        for migration in pending {
            let span = migration_span(migration.version, &migration.name);
            results.push(self.apply(migration).instrument(span).await?);
        }
        Ok(results)
    }

    async fn apply(&self, migration: Migration) -> Result<MigrationResult, MigrationError> {
        let start = std::time::Instant::now();
        info!("applying migration {} - {}", migration.version, migration.name);

        let mut tx = self.pool.begin().await?;

        (&mut *tx)
            .execute(migration.up_sql.as_str())
            .await
            .map_err(|source| MigrationError::ExecutionFailed {
                version: migration.version,
                source,
            })?;

        let execution_time_ms = start.elapsed().as_millis() as i64;
        sqlx::query(
            "INSERT INTO _rowtrail_migrations
             (version, name, checksum, applied_at, execution_time_ms)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(migration.version)
        .bind(&migration.name)
        .bind(&migration.checksum)
        .bind(Utc::now())
        .bind(execution_time_ms)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(MigrationResult {
            version: migration.version,
            name: migration.name,
            execution_time_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::pool::{DatabasePool, PoolConfig};

    async fn setup_pool() -> SqlitePool {
        DatabasePool::new(PoolConfig::in_memory())
            .await
            .unwrap()
            .pool()
            .clone()
    }

    #[tokio::test]
    async fn test_migration_runner_init() {
        let runner = MigrationRunner::new(setup_pool().await);

        runner.init().await.unwrap();
        assert_eq!(runner.current_version().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_audit_migrations_apply_once() {
        let runner = MigrationRunner::with_audit_tables(setup_pool().await);

        let results = runner.run().await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].name, "create_audit_column_log");
        assert_eq!(runner.current_version().await.unwrap(), Some(2));

        assert!(runner.run().await.unwrap().is_empty());
        assert_eq!(runner.applied().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_checksum_mismatch_blocks_run() {
        let pool = setup_pool().await;
        let mut runner = MigrationRunner::new(pool.clone());
        runner.add_migration(Migration::new(1, "widgets", "CREATE TABLE widgets (id INTEGER)"));
        runner.run().await.unwrap();

        let mut edited = MigrationRunner::new(pool);
        edited.add_migration(Migration::new(
            1,
            "widgets",
            "CREATE TABLE widgets (id INTEGER, name TEXT)",
        ));

        let err = edited.run().await.unwrap_err();
        assert!(matches!(err, MigrationError::ChecksumMismatch { version: 1, .. }));
    }

    #[tokio::test]
    async fn test_failed_migration_is_not_recorded() {
        let mut runner = MigrationRunner::new(setup_pool().await);
        runner.add_migration(Migration::new(1, "broken", "CREATE TABLE (oops"));

        let err = runner.run().await.unwrap_err();
        assert!(matches!(err, MigrationError::ExecutionFailed { version: 1, .. }));
        assert_eq!(runner.current_version().await.unwrap(), None);
    }
}
