//! Spans shared by the capture engine and the SQLite store.
//!
//! Every span declares an empty `error` field so a failure deep inside an
//! invocation can be attached to it with [`record_error`].

use std::time::{Duration, Instant};
use tracing::field::{display, Empty};
use tracing::{info_span, Span};

/// One `on_mutate` invocation.
pub fn capture_span(table: &str, operation: &str) -> Span {
    info_span!("capture", table, operation, error = Empty)
}

/// One audit store call, such as recording an event.
pub fn store_span(action: &str, table: &str) -> Span {
    info_span!("store", action, table, error = Empty)
}

/// Applying one schema migration.
pub fn migration_span(version: i64, name: &str) -> Span {
    info_span!("migration", version, name, error = Empty)
}

/// Attach `error` to the current span's `error` field.
pub fn record_error(error: &dyn std::error::Error) {
    Span::current().record("error", display(error));
}

/// Measures one stage and logs its duration at debug level when finished.
#[derive(Debug)]
pub struct Timer {
    stage: &'static str,
    started: Instant,
}

impl Timer {
    pub fn start(stage: &'static str) -> Self {
        Self {
            stage,
            started: Instant::now(),
        }
    }

    /// Log and return the elapsed time.
    pub fn finish(self) -> Duration {
        let elapsed = self.started.elapsed();
        tracing::debug!(
            stage = self.stage,
            elapsed_us = elapsed.as_micros() as u64,
            "stage finished"
        );
        elapsed
    }
}
