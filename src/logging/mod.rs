//! Logging and observability
//!
//! This module provides structured logging with support for:
//! - Console output, always on
//! - JSON-formatted file logs with daily or hourly rotation
//! - Per-task macros with consistent field names (`table`, `partition`,
//!   `phase`, `elapsed_ms`)
//!
//! # Example
//!
//! ```no_run
//! use idr_pipeline::logging::init_logging;
//! use idr_pipeline::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!("Pipeline started");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log the start of a task
///
/// # Example
///
/// ```no_run
/// use idr_pipeline::log_task_start;
///
/// log_task_start!("idr.claim", "pac-2020-01-01-2020-12-31", 1);
/// ```
#[macro_export]
macro_rules! log_task_start {
    ($table:expr, $partition:expr, $stage:expr) => {
        tracing::info!(
            table = %$table,
            partition = %$partition,
            stage = $stage,
            "Starting task"
        );
    };
}

/// Log the elapsed time of one load phase
///
/// # Example
///
/// ```no_run
/// use idr_pipeline::log_phase_elapsed;
/// use std::time::Duration;
///
/// log_phase_elapsed!("idr.claim", "pac", "merge", Duration::from_millis(120));
/// ```
#[macro_export]
macro_rules! log_phase_elapsed {
    ($table:expr, $partition:expr, $phase:expr, $elapsed:expr) => {
        tracing::info!(
            table = %$table,
            partition = %$partition,
            phase = %$phase,
            elapsed_ms = $elapsed.as_millis() as u64,
            "Phase complete"
        );
    };
}

/// Log a retry attempt after a transient source failure
///
/// # Example
///
/// ```no_run
/// use idr_pipeline::log_retry_attempt;
///
/// log_retry_attempt!("idr.claim", "pac", 2, 3, "connection reset");
/// ```
#[macro_export]
macro_rules! log_retry_attempt {
    ($table:expr, $partition:expr, $attempt:expr, $max_errors:expr, $reason:expr) => {
        tracing::warn!(
            table = %$table,
            partition = %$partition,
            attempt = $attempt,
            max_errors = $max_errors,
            reason = %$reason,
            "Transient source error, reconnecting"
        );
    };
}
