//! Logging Infrastructure
//!
//! Structured logging through `tracing`, to stdout or to daily rolling files.

use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Initialize the logger at `info` on stdout
pub fn init_logger() {
    init_logger_with_file(None, None, None);
}

/// Initialize the logger with optional JSON format and file output
///
/// `log_level` accepts a plain level (`debug`) or a full filter directive
/// (`box_office=debug,info`). Calling this twice is harmless; the second
/// subscriber is ignored.
pub fn init_logger_with_file(log_level: Option<&str>, json: Option<bool>, log_dir: Option<&str>) {
    let level = log_level.unwrap_or("info");
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(false);

    let file_appender = log_dir
        .map(Path::new)
        .filter(|dir| dir.exists())
        .and_then(|dir| dir.to_str())
        .map(|dir| tracing_appender::rolling::daily(dir, "box-office"));

    let result = match (file_appender, json.unwrap_or(false)) {
        (Some(appender), true) => builder.json().with_writer(appender).try_init(),
        (Some(appender), false) => builder.with_ansi(false).with_writer(appender).try_init(),
        (None, true) => builder.json().try_init(),
        (None, false) => builder.try_init(),
    };

    if result.is_err() {
        tracing::debug!("Logger already initialized");
    }
}
