//! Configuration file loading and parsing.

use crate::env::{apply_env_overrides, vars, EnvError};
use crate::types::RowtrailConfig;
use regex::Regex;
use rowtrail_types::TableIdentity;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Config loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("failed to read config: {source}")]
    ReadError {
        #[from]
        source: std::io::Error,
    },

    #[error(
        "invalid YAML at line {}: {message}",
        line.map_or_else(|| "unknown".to_string(), |l| l.to_string())
    )]
    ParseError { line: Option<usize>, message: String },

    #[error("validation error: {message}")]
    ValidationError { message: String },

    #[error("environment variable not found: {var}")]
    EnvVarNotFound { var: String },

    #[error("invalid expansion pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error(transparent)]
    Env(#[from] EnvError),
}

/// Directory and file name of the project config.
pub const CONFIG_FILE: &str = ".rowtrail/config.yaml";

const ENV_PATTERN: &str = r"\$\{([^}:]+)(?::-([^}]*))?\}";

/// Configuration loader.
pub struct ConfigLoader {
    base_path: PathBuf,
}

impl ConfigLoader {
    /// Create a loader for the given project directory.
    pub fn new(project_dir: impl AsRef<Path>) -> Self {
        Self {
            base_path: project_dir.as_ref().to_path_buf(),
        }
    }

    /// Path the config is read from: `ROWTRAIL_CONFIG_PATH` when set, else
    /// `.rowtrail/config.yaml` under the project directory.
    pub fn config_path(&self) -> PathBuf {
        std::env::var(vars::ROWTRAIL_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| self.base_path.join(CONFIG_FILE))
    }

    /// Load, expand, apply env overrides and validate.
    ///
    /// A missing default config file yields defaults; a missing file named by
    /// `ROWTRAIL_CONFIG_PATH` is an error.
    pub fn load(&self) -> Result<RowtrailConfig, ConfigError> {
        let config_path = self.config_path();

        let mut config = if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)?;
            self.parse(&contents)?
        } else if std::env::var_os(vars::ROWTRAIL_CONFIG_PATH).is_some() {
            return Err(ConfigError::NotFound { path: config_path });
        } else {
            debug!(path = %config_path.display(), "no config file, using defaults");
            RowtrailConfig::default()
        };

        apply_env_overrides(&mut config)?;
        validate(&config)?;
        Ok(config)
    }

    /// Parse YAML text after env expansion, without validation.
    pub fn parse(&self, contents: &str) -> Result<RowtrailConfig, ConfigError> {
        let expanded = self.expand_env_vars(contents)?;
        serde_yaml::from_str(&expanded).map_err(|e| ConfigError::ParseError {
            line: e.location().map(|l| l.line()),
            message: e.to_string(),
        })
    }

    /// Expand environment variables in the form `${VAR}` or `${VAR:-default}`.
    fn expand_env_vars(&self, content: &str) -> Result<String, ConfigError> {
        let re = Regex::new(ENV_PATTERN)?;
        let mut missing = None;
        let expanded = re.replace_all(content, |cap: &regex::Captures<'_>| {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(v) => v,
                Err(_) => match cap.get(2) {
                    Some(default) => default.as_str().to_string(),
                    None => {
                        missing.get_or_insert_with(|| var_name.to_string());
                        String::new()
                    }
                },
            }
        });

        match missing {
            Some(var) => Err(ConfigError::EnvVarNotFound { var }),
            None => Ok(expanded.into_owned()),
        }
    }

    /// Save configuration to `.rowtrail/config.yaml`.
    pub fn save(&self, config: &RowtrailConfig) -> Result<(), ConfigError> {
        let config_path = self.base_path.join(CONFIG_FILE);
        if let Some(dir) = config_path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let yaml = serde_yaml::to_string(config).map_err(|e| ConfigError::ParseError {
            line: None,
            message: e.to_string(),
        })?;

        std::fs::write(config_path, yaml)?;
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new(std::env::current_dir().unwrap_or_default())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        message: message.into(),
    }
}

/// Validate configuration values.
pub fn validate(config: &RowtrailConfig) -> Result<(), ConfigError> {
    if config.database.path.trim().is_empty() {
        return Err(invalid("database.path must not be empty"));
    }

    if config.database.max_connections == 0 {
        return Err(invalid("database.max_connections must be greater than 0"));
    }

    if config.database.min_connections > config.database.max_connections {
        return Err(invalid(
            "database.min_connections must not exceed database.max_connections",
        ));
    }

    let mut seen = HashSet::new();
    for (index, table) in config.tables.iter().enumerate() {
        let identity = TableIdentity::parse(&table.table)
            .ok_or_else(|| invalid(format!("tables[{index}].table is not a valid table name")))?;

        if !seen.insert(identity.clone()) {
            return Err(invalid(format!("table {identity} is configured twice")));
        }

        if let Some(keys) = &table.key_columns {
            if keys.is_empty() {
                return Err(invalid(format!(
                    "tables[{index}].key_columns must not be empty; omit it to use the primary key"
                )));
            }
            if keys.iter().any(|k| k.trim().is_empty()) {
                return Err(invalid(format!("tables[{index}].key_columns contains an empty name")));
            }
        }
    }

    Ok(())
}
