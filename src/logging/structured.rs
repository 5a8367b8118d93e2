//! Subscriber setup for pipeline runs
//!
//! Console output is always on. With `logging.local_enabled` every event is
//! also written as JSON to a rolling `idr-pipeline.log` file, so the per-task
//! fields (`table`, `partition`, `stage`, `elapsed_ms`) stay queryable after
//! the run.
//!
//! ```no_run
//! use idr_pipeline::config::LoggingConfig;
//! use idr_pipeline::logging::init_logging;
//!
//! let config = LoggingConfig {
//!     local_enabled: true,
//!     local_path: "/var/log/idr-pipeline".to_string(),
//!     local_rotation: "hourly".to_string(),
//! };
//! let _guard = init_logging("debug", &config).expect("logging");
//! ```

use crate::config::LoggingConfig;
use crate::domain::{PipelineError, Result};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// File name prefix; the appender adds the date or hour suffix
pub const LOG_FILE_NAME: &str = "idr-pipeline.log";

/// Keeps the background file writer alive; dropping it flushes pending lines
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Install the global subscriber
///
/// `RUST_LOG` wins over `log_level`. Driver crates are held at `warn` unless
/// `RUST_LOG` says otherwise, so connection chatter does not drown the task
/// log at `debug`.
pub fn init_logging(log_level: &str, config: &LoggingConfig) -> Result<LoggingGuard> {
    let level = parse_log_level(log_level)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let mut layers = vec![tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_filter(filter.clone())
        .boxed()];

    let file_guard = if config.local_enabled {
        let (writer, guard) = tracing_appender::non_blocking(open_log_file(config)?);
        layers.push(
            tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_span_events(FmtSpan::CLOSE)
                .with_writer(writer)
                .with_filter(filter)
                .boxed(),
        );
        Some(guard)
    } else {
        None
    };

    tracing_subscriber::registry().with(layers).init();

    tracing::info!(
        level = %level,
        file = config.local_enabled,
        path = %config.local_path,
        rotation = %config.local_rotation,
        "Logging initialized"
    );

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

fn default_directives(level: Level) -> String {
    let level = level.as_str().to_lowercase();
    format!("idr_pipeline={level},tokio_postgres=warn,deadpool_postgres=warn")
}

fn rotation(name: &str) -> Rotation {
    match name {
        "hourly" => Rotation::HOURLY,
        _ => Rotation::DAILY,
    }
}

/// Create the log directory and the rolling appender inside it
fn open_log_file(config: &LoggingConfig) -> Result<RollingFileAppender> {
    std::fs::create_dir_all(&config.local_path).map_err(|e| {
        PipelineError::Configuration(format!(
            "Failed to create log directory {}: {e}",
            config.local_path
        ))
    })?;
    Ok(RollingFileAppender::new(
        rotation(&config.local_rotation),
        &config.local_path,
        LOG_FILE_NAME,
    ))
}

fn parse_log_level(name: &str) -> Result<Level> {
    match name.to_ascii_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(PipelineError::Configuration(format!(
            "Invalid log level: {name}. Must be one of: trace, debug, info, warn, error"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_cli_log_levels_parse() {
        assert_eq!(parse_log_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level("WARN").unwrap(), Level::WARN);
        assert_eq!(parse_log_level("Info").unwrap(), Level::INFO);

        let err = parse_log_level("verbose").unwrap_err();
        assert!(err.to_string().contains("verbose"));
        assert!(parse_log_level("").is_err());
    }

    #[test]
    fn test_default_directives_quiet_the_drivers() {
        let directives = default_directives(Level::TRACE);

        assert!(directives.starts_with("idr_pipeline=trace,"));
        assert!(directives.contains("tokio_postgres=warn"));
        assert!(directives.contains("deadpool_postgres=warn"));
        assert!(directives.parse::<EnvFilter>().is_ok());
    }

    #[test]
    fn test_open_log_file_creates_nested_directory() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = temp_dir.path().join("runs").join("incremental");
        let config = LoggingConfig {
            local_enabled: true,
            local_path: log_dir.to_string_lossy().to_string(),
            local_rotation: "hourly".to_string(),
        };

        let mut appender = open_log_file(&config).unwrap();
        appender
            .write_all(b"{\"table\":\"idr.claim\",\"message\":\"Starting task\"}\n")
            .unwrap();
        appender.flush().unwrap();

        let files: Vec<String> = std::fs::read_dir(&log_dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(files.len(), 1);
        assert!(files[0].starts_with(LOG_FILE_NAME));
    }

    #[test]
    fn test_open_log_file_rejects_path_under_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();
        let config = LoggingConfig {
            local_enabled: true,
            local_path: blocker.join("logs").to_string_lossy().to_string(),
            local_rotation: "daily".to_string(),
        };

        let err = open_log_file(&config).unwrap_err();
        assert!(err.to_string().contains("Failed to create log directory"));
    }
}
