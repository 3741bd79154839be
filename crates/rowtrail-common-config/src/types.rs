//! Configuration types.

use rowtrail_capture::{CaptureConfig, TableRegistration};
use rowtrail_common_log::{LogConfig, LogFormat, LogLevel};
use rowtrail_types::{AuditMode, TableIdentity};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RowtrailConfig {
    /// Capture engine settings.
    pub capture: CaptureSettings,
    /// Hosting database settings.
    pub database: DatabaseSettings,
    /// Audited tables.
    pub tables: Vec<TableSettings>,
    /// Logging settings.
    pub log: LogSettings,
}

/// Capture engine settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Entry shape written for every table.
    pub mode: AuditMode,
    /// Columns never audited on any table, e.g. `updated_at`.
    pub skip_columns: Vec<String>,
}

/// SQLite database settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Database file, or `:memory:`.
    pub path: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Enable WAL journal mode.
    pub wal_mode: bool,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
    pub foreign_keys: bool,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: "rowtrail.db".to_string(),
            max_connections: 5,
            min_connections: 1,
            wal_mode: true,
            busy_timeout_ms: 5000,
            foreign_keys: true,
        }
    }
}

/// One audited table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableSettings {
    /// `schema.table` or a bare table name in the main schema.
    pub table: String,
    /// Key override for tables without a usable primary key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_columns: Option<Vec<String>>,
    /// Columns excluded on this table only.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skip_columns: Vec<String>,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    /// `pretty`, `compact` or `json`.
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file: None,
        }
    }
}

impl RowtrailConfig {
    /// Capture engine configuration.
    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig::new(self.capture.mode)
            .with_default_skip_columns(self.capture.skip_columns.iter().cloned())
    }

    /// Table registrations, skipping entries whose name does not parse.
    ///
    /// Loaded configs are validated, so nothing is skipped for them.
    pub fn registrations(&self) -> Vec<TableRegistration> {
        self.tables
            .iter()
            .filter_map(TableSettings::registration)
            .collect()
    }

    /// Logging configuration.
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: LogLevel::parse(&self.log.level).unwrap_or_default(),
            format: LogFormat::parse(&self.log.format),
            file_path: self.log.file.clone(),
            ..LogConfig::default()
        }
    }
}

impl TableSettings {
    /// Audit registration for this table, `None` if the name is invalid.
    pub fn registration(&self) -> Option<TableRegistration> {
        let table = TableIdentity::parse(&self.table)?;
        let mut registration =
            TableRegistration::new(table).with_skip_columns(self.skip_columns.iter().cloned());
        if let Some(keys) = &self.key_columns {
            registration = registration.with_key_columns(keys.iter().cloned());
        }
        Some(registration)
    }
}
