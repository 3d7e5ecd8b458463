//! Tracing subscriber setup
//!
//! The one-shot CLI logs to stderr only. The daemon additionally writes a
//! debug-level log under the configured log directory, rotated by size with
//! a bounded number of backups.

use std::path::Path;

use file_rotate::compression::Compression;
use file_rotate::suffix::AppendCount;
use file_rotate::{ContentLimit, FileRotate};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::error::{Error, Result};

/// Daemon log file name inside the log directory
pub const LOG_FILE_NAME: &str = "chrome_scraper.log";

/// Size at which the daemon log is rotated
pub const MAX_LOG_BYTES: usize = 10 * 1024 * 1024;

/// Rotated daemon log backups kept on disk
pub const MAX_LOG_FILES: usize = 5;

/// Size-capped log writer: `<name>` plus up to [`MAX_LOG_FILES`] numbered
/// backups, the oldest dropped first.
pub fn rotating_writer(logs_dir: &Path, max_bytes: usize) -> FileRotate<AppendCount> {
    FileRotate::new(
        logs_dir.join(LOG_FILE_NAME),
        AppendCount::new(MAX_LOG_FILES),
        ContentLimit::Bytes(max_bytes),
        Compression::None,
        #[cfg(unix)]
        None,
    )
}

fn console_filter(verbose: bool, quiet_default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "debug" } else { quiet_default })
    })
}

/// Initialize stderr logging for one-shot CLI commands.
pub fn init_cli(verbose: bool) {
    let filter = console_filter(verbose, "warn");

    // Ignore the error if a subscriber is already installed (tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Initialize daemon logging: info to stderr, debug to a size-capped file.
///
/// The returned guard flushes the file writer on drop and must be held for
/// the life of the daemon.
pub fn init_daemon(logs_dir: &Path, verbose: bool) -> Result<WorkerGuard> {
    std::fs::create_dir_all(logs_dir)?;

    let (file_writer, guard) =
        tracing_appender::non_blocking(rotating_writer(logs_dir, MAX_LOG_BYTES));

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(console_filter(verbose, "info"));

    let file = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_filter(EnvFilter::new("debug,chromiumoxide=warn,hyper=info,tungstenite=info"));

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| Error::generic(format!("Failed to install logger: {e}")))?;

    Ok(guard)
}
