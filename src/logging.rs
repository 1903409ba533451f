//! Tracing subscriber setup for the binary.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use dapdrive_config::{LogConfig, LogLevel};
use tracing_subscriber::EnvFilter;

/// Convert a configured level to an `EnvFilter` directive.
pub fn log_level_to_filter(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Trace => "trace",
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}

/// Ensure the parent directory of a log file exists, creating it if necessary.
pub fn ensure_log_dir(log_path: &Path) -> io::Result<()> {
    if let Some(parent) = log_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level. Output goes to `log.file`
/// (appended, no ANSI colours) when set, otherwise to stderr.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level_to_filter(config.level)));

    match &config.file {
        Some(path) => {
            ensure_log_dir(path)
                .with_context(|| format!("failed to create log directory for {}", path.display()))?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .init();
        }
    }
    Ok(())
}
