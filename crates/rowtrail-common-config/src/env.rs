//! Environment variable handling.

use crate::types::RowtrailConfig;
use rowtrail_types::AuditMode;
use std::env;
use thiserror::Error;
use tracing::debug;

/// Environment variable errors.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("required environment variable not set: {var}")]
    NotSet { var: String },

    #[error("invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },

    #[error("failed to load .env file: {0}")]
    DotenvError(#[from] dotenvy::Error),
}

/// Environment variable names.
pub mod vars {
    // Configuration
    pub const ROWTRAIL_CONFIG_PATH: &str = "ROWTRAIL_CONFIG_PATH";
    pub const ROWTRAIL_ENV: &str = "ROWTRAIL_ENV";

    // Overrides
    pub const ROWTRAIL_AUDIT_MODE: &str = "ROWTRAIL_AUDIT_MODE";
    pub const ROWTRAIL_DATABASE_PATH: &str = "ROWTRAIL_DATABASE_PATH";
    pub const ROWTRAIL_DATABASE_MAX_CONNECTIONS: &str = "ROWTRAIL_DATABASE_MAX_CONNECTIONS";

    // Logging
    pub const ROWTRAIL_LOG_LEVEL: &str = "ROWTRAIL_LOG_LEVEL";
    pub const RUST_LOG: &str = "RUST_LOG";
}

/// Environment configuration.
pub struct Environment {
    _guard: (),
}

impl Environment {
    /// Initialize environment from .env files.
    ///
    /// Loads `.env`, then `.env.local`, then `.env.<ROWTRAIL_ENV>`. Variables
    /// already set in the process are never overwritten. Missing files are
    /// ignored; malformed ones are errors.
    pub fn init() -> Result<Self, EnvError> {
        load_optional(".env")?;
        load_optional(".env.local")?;

        if let Ok(name) = env::var(vars::ROWTRAIL_ENV) {
            load_optional(&format!(".env.{}", name))?;
        }

        Ok(Self { _guard: () })
    }

    /// Get a required string variable.
    pub fn require(var: &str) -> Result<String, EnvError> {
        env::var(var).map_err(|_| EnvError::NotSet { var: var.to_string() })
    }

    /// Get an optional string variable.
    pub fn get(var: &str) -> Option<String> {
        env::var(var).ok()
    }

    /// Get a variable with a default value.
    pub fn get_or(var: &str, default: &str) -> String {
        env::var(var).unwrap_or_else(|_| default.to_string())
    }

    /// Get a boolean variable.
    pub fn get_bool(var: &str) -> Option<bool> {
        env::var(var)
            .ok()
            .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
    }
}

fn load_optional(file: &str) -> Result<(), EnvError> {
    match dotenvy::from_filename(file) {
        Ok(path) => {
            debug!(path = %path.display(), "loaded env file");
            Ok(())
        }
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Apply `ROWTRAIL_*` overrides from the process environment.
pub fn apply_env_overrides(config: &mut RowtrailConfig) -> Result<(), EnvError> {
    apply_overrides_from(config, |var| env::var(var).ok())
}

/// Apply overrides read through `lookup`.
pub fn apply_overrides_from(
    config: &mut RowtrailConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), EnvError> {
    if let Some(mode) = lookup(vars::ROWTRAIL_AUDIT_MODE) {
        config.capture.mode =
            mode.trim()
                .parse::<AuditMode>()
                .map_err(|_| EnvError::InvalidValue {
                    var: vars::ROWTRAIL_AUDIT_MODE.to_string(),
                    message: format!("expected column_grained or row_grained, got {:?}", mode),
                })?;
    }

    if let Some(path) = lookup(vars::ROWTRAIL_DATABASE_PATH) {
        config.database.path = path;
    }

    if let Some(max) = lookup(vars::ROWTRAIL_DATABASE_MAX_CONNECTIONS) {
        config.database.max_connections =
            max.trim().parse().map_err(|_| EnvError::InvalidValue {
                var: vars::ROWTRAIL_DATABASE_MAX_CONNECTIONS.to_string(),
                message: "expected integer".to_string(),
            })?;
    }

    if let Some(level) = lookup(vars::ROWTRAIL_LOG_LEVEL) {
        config.log.level = level;
    }

    Ok(())
}
