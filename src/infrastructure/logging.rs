use std::fs;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::domain::DomainError;

const LOG_FILE_PREFIX: &str = "cogniflow.log";

/// Default filter: `level` for this crate, warnings from dependencies.
fn default_filter(level: &str) -> String {
    format!("cogniflow={level},cogniflow_lib={level},warn")
}

/// Initialize console logging and, optionally, a JSON log file rotated
/// daily in `logs_dir`, keeping at most `max_files` files.
///
/// `RUST_LOG` overrides the console filter. The returned guard flushes the
/// file writer on drop and must outlive the application.
pub fn init_logging(
    logs_dir: &Path,
    level: &str,
    file_logging: bool,
    max_files: u32,
) -> Result<Option<WorkerGuard>, DomainError> {
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(level)));

    // Progress is printed by the CLI, so keep the console terse.
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_span_events(FmtSpan::NONE)
        .with_filter(console_filter);

    if !file_logging {
        let _ = tracing_subscriber::registry().with(console_layer).try_init();
        tracing::debug!(level, "Logging initialized (console only)");
        return Ok(None);
    }

    fs::create_dir_all(logs_dir)?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .max_log_files(max_files.max(1) as usize)
        .build(logs_dir)
        .map_err(|e| DomainError::Config(format!("Failed to create log file: {}", e)))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .json()
        .with_span_events(FmtSpan::CLOSE)
        .with_filter(EnvFilter::new(default_filter(level)));

    // try_init: a second call (tests, embedding) keeps the first subscriber.
    if tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .is_ok()
    {
        tracing::debug!(logs_dir = ?logs_dir, level, "Logging initialized with file output");
    }

    Ok(Some(guard))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        let filter = default_filter("debug");
        assert!(filter.starts_with("cogniflow=debug"));
        assert!(EnvFilter::try_new(filter).is_ok());
    }

    #[test]
    fn test_file_logging_creates_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let logs = dir.path().join("logs");
        let guard = init_logging(&logs, "info", true, 3).unwrap();
        assert!(guard.is_some());
        assert!(logs.is_dir());
    }
}
