//! Log output for the command-line tool.
//!
//! The library only emits `tracing` events. This module installs the
//! subscriber that writes them to the console and appends them to a log file,
//! one timestamped line per event. The caller owns the returned guard and
//! with it the lifetime of the log file.

use anyhow::{Context, Result};
use chrono::Local;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Log file used when none is given on the command line
pub const DEFAULT_LOG_FILE: &str = "/var/log/backup.log";

/// `2024-05-01 13:37:00` timestamps in local time
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTimestamp;

impl FormatTime for LocalTimestamp {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "[{}]", Local::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

/// Keeps the log file open; flushes it to disk when dropped
#[derive(Debug)]
pub struct LogGuard {
    file: Option<Arc<File>>,
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        if let Some(file) = &self.file {
            let _ = file.sync_all();
        }
    }
}

/// Open (appending) the log file, creating its directory if absent
pub fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

/// Install the global subscriber.
///
/// `RUST_LOG` selects the level unless `verbose` forces `debug`. When the log
/// file cannot be opened, logging continues on the console only.
pub fn init(log_file: Option<&Path>, verbose: bool) -> Result<LogGuard> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let (file, open_error) = match log_file.map(open_log_file).transpose() {
        Ok(file) => (file.map(Arc::new), None),
        Err(e) => (None, Some(e)),
    };

    let console_layer = tracing_subscriber::fmt::layer()
        .with_timer(LocalTimestamp)
        .with_target(false);

    let file_layer = file.clone().map(|file| {
        tracing_subscriber::fmt::layer()
            .with_timer(LocalTimestamp)
            .with_target(false)
            .with_ansi(false)
            .with_writer(file)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install log subscriber")?;

    if let Some(e) = open_error {
        warn!("Logging to console only: {:#}", e);
    }

    Ok(LogGuard { file })
}
