//! SQLite connection pool hosting the audited tables and the audit log.

use rowtrail_common_config::DatabaseSettings;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument};

const MEMORY: &str = ":memory:";

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Failed to create connection pool: {0}")]
    Creation(#[from] sqlx::Error),

    #[error("Pool health check failed: {0}")]
    HealthCheck(String),

    #[error("Invalid pool configuration: {0}")]
    InvalidConfig(String),
}

/// Connection and pragma settings applied to every pooled connection.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Database file, or `:memory:`.
    pub database_path: String,
    pub min_connections: u32,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// `None` keeps idle connections open.
    pub idle_timeout: Option<Duration>,
    /// `None` never recycles a connection.
    pub max_lifetime: Option<Duration>,
    pub wal_mode: bool,
    pub synchronous: SqliteSynchronous,
    /// How long a writer waits on a locked database.
    pub busy_timeout: Duration,
    pub foreign_keys: bool,
    pub create_if_missing: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from(&DatabaseSettings::default())
    }
}

impl From<&DatabaseSettings> for PoolConfig {
    fn from(settings: &DatabaseSettings) -> Self {
        if settings.path == MEMORY {
            return Self::in_memory();
        }
        Self {
            database_path: settings.path.clone(),
            min_connections: settings.min_connections,
            max_connections: settings.max_connections,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            max_lifetime: Some(Duration::from_secs(1800)),
            wal_mode: settings.wal_mode,
            synchronous: SqliteSynchronous::Full,
            busy_timeout: Duration::from_millis(settings.busy_timeout_ms),
            foreign_keys: settings.foreign_keys,
            create_if_missing: true,
        }
    }
}

impl PoolConfig {
    /// A private in-memory database on one connection that is never
    /// recycled, since closing it would discard the database.
    pub fn in_memory() -> Self {
        Self {
            database_path: MEMORY.to_string(),
            min_connections: 1,
            max_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: None,
            max_lifetime: None,
            wal_mode: false,
            synchronous: SqliteSynchronous::Full,
            busy_timeout: Duration::from_secs(5),
            foreign_keys: true,
            create_if_missing: true,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path == MEMORY
    }

    pub fn validate(&self) -> Result<(), PoolError> {
        let problem = if self.max_connections == 0 {
            "max_connections must be at least 1"
        } else if self.min_connections > self.max_connections {
            "min_connections cannot exceed max_connections"
        } else if self.is_in_memory() && self.max_connections > 1 {
            "an in-memory database is private to one connection"
        } else {
            return Ok(());
        };
        Err(PoolError::InvalidConfig(problem.to_string()))
    }

    fn connect_options(&self) -> Result<SqliteConnectOptions, PoolError> {
        let base = if self.is_in_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            SqliteConnectOptions::new()
                .filename(&self.database_path)
                .create_if_missing(self.create_if_missing)
        };

        let journal = if self.wal_mode {
            SqliteJournalMode::Wal
        } else {
            SqliteJournalMode::Delete
        };

        Ok(base
            .journal_mode(journal)
            .synchronous(self.synchronous)
            .busy_timeout(self.busy_timeout)
            .foreign_keys(self.foreign_keys))
    }
}

/// An open pool plus the settings it was built with.
pub struct DatabasePool {
    pool: SqlitePool,
    config: PoolConfig,
}

impl DatabasePool {
    /// Open the pool and check that it answers.
    #[instrument(skip(config), fields(path = %config.database_path))]
    pub async fn new(config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;

        let pool = SqlitePoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect_with(config.connect_options()?)
            .await?;

        info!(
            max_connections = config.max_connections,
            wal = config.wal_mode,
            "database pool opened"
        );

        let db = Self { pool, config };
        db.health_check().await?;
        Ok(db)
    }

    /// Open the pool described by the `database` section of the config.
    pub async fn from_settings(settings: &DatabaseSettings) -> Result<Self, PoolError> {
        Self::new(PoolConfig::from(settings)).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub async fn health_check(&self) -> Result<(), PoolError> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(drop)
            .map_err(|e| PoolError::HealthCheck(e.to_string()))
    }

    /// Wait for checked-out connections and close them.
    pub async fn close(&self) {
        info!("closing database pool");
        self.pool.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}
