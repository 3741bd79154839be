//! Logging setup for Rowtrail.
//!
//! [`init`] installs a `tracing` subscriber writing to stderr and, optionally,
//! to a log file. Settings come from [`LogConfig`], usually built with
//! [`LogConfig::from_env`] or from the `log` section of the config file.

use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::{self, format::FmtSpan, MakeWriter};
use tracing_subscriber::{layer::SubscriberExt, registry::Registry, util::SubscriberInitExt};
use tracing_subscriber::{EnvFilter, Layer};

/// Convenience macros re-exported from tracing.
pub use tracing::{debug, error, info, trace, warn};

pub mod spans;

/// Logging errors.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("failed to initialize logging: {0}")]
    InitError(String),

    #[error("failed to open log file: {0}")]
    FileError(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    const ALL: [LogLevel; 5] = [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
    ];

    /// Case-insensitive; `warning` is accepted for `warn`.
    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("warning") {
            return Some(LogLevel::Warn);
        }
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
    }

    /// Directive understood by `EnvFilter`.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    pub fn filter(&self) -> LevelFilter {
        match self {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, human oriented.
    #[default]
    Pretty,
    Compact,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Unrecognised names fall back to pretty.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else if s.eq_ignore_ascii_case("compact") {
            LogFormat::Compact
        } else {
            LogFormat::Pretty
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Also append to this file when set.
    pub file_path: Option<PathBuf>,
    /// Include file and line of each event.
    pub source_location: bool,
    /// Log span open and close.
    pub span_events: bool,
}

fn flag(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

impl LogConfig {
    /// Read `ROWTRAIL_LOG_*` variables from the process environment.
    ///
    /// `ROWTRAIL_LOG_LEVEL` wins over `RUST_LOG` when both are set.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let level = lookup("ROWTRAIL_LOG_LEVEL")
            .or_else(|| lookup("RUST_LOG"))
            .and_then(|level| LogLevel::parse(&level))
            .unwrap_or_default();

        Self {
            level,
            format: lookup("ROWTRAIL_LOG_FORMAT")
                .map(|format| LogFormat::parse(&format))
                .unwrap_or_default(),
            file_path: lookup("ROWTRAIL_LOG_FILE").map(PathBuf::from),
            source_location: lookup("ROWTRAIL_LOG_SOURCE").is_some_and(|v| flag(&v)),
            span_events: lookup("ROWTRAIL_LOG_SPANS").is_some_and(|v| flag(&v)),
        }
    }

    fn span_events(&self) -> FmtSpan {
        if self.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }

    fn layer<W>(&self, writer: W, ansi: bool) -> Box<dyn Layer<Registry> + Send + Sync>
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let base = fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_file(self.source_location)
            .with_line_number(self.source_location)
            .with_span_events(self.span_events());

        match self.format {
            LogFormat::Pretty => base.boxed(),
            LogFormat::Compact => base.compact().boxed(),
            LogFormat::Json => base.json().boxed(),
        }
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` directives, when valid, replace the configured level.
pub fn init(config: LogConfig) -> Result<(), LogError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let mut layers = vec![config.layer(io::stderr, true)];
    if let Some(path) = &config.file_path {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        layers.push(config.layer(Mutex::new(file), false));
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| LogError::InitError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!(LogLevel::parse("DEBUG"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse("Warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("verbose"), None);
        assert_eq!(LogLevel::Error.filter(), LevelFilter::ERROR);
    }

    #[test]
    fn test_log_format_falls_back_to_pretty() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("compact"), LogFormat::Compact);
        assert_eq!(LogFormat::parse("fancy"), LogFormat::Pretty);
    }

    #[test]
    fn test_empty_environment_gives_defaults() {
        let config = LogConfig::from_lookup(lookup(&[]));
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(config.file_path.is_none());
        assert!(!config.source_location && !config.span_events);
    }

    #[test]
    fn test_rowtrail_variables() {
        let config = LogConfig::from_lookup(lookup(&[
            ("ROWTRAIL_LOG_LEVEL", "debug"),
            ("ROWTRAIL_LOG_FORMAT", "json"),
            ("ROWTRAIL_LOG_FILE", "/var/log/rowtrail.log"),
            ("ROWTRAIL_LOG_SOURCE", "true"),
            ("ROWTRAIL_LOG_SPANS", "1"),
            ("RUST_LOG", "error"),
        ]));
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.file_path, Some(PathBuf::from("/var/log/rowtrail.log")));
        assert!(config.source_location);
        assert!(config.span_events);
    }

    #[test]
    fn test_rust_log_used_when_level_unset() {
        let config = LogConfig::from_lookup(lookup(&[("RUST_LOG", "warn")]));
        assert_eq!(config.level, LogLevel::Warn);
    }
}
