//! Tracing setup for the daemon and the CLI.
//!
//! The daemon logs to the systemd journal on Linux and to a daily rolling
//! file in the mediadex log directory otherwise. Interactive commands log
//! to stderr. Both read their filter from `MEDIADEX_LOG`.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_ENV: &str = "MEDIADEX_LOG";
const LOG_FILE_PREFIX: &str = "mediadex.log";

/// Keeps the file writer flushing for the life of the process.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// `MEDIADEX_LOG` as an `EnvFilter` directive, or `default` when unset or
/// unparsable.
fn filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default))
}

fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mediadex")
        .join("logs")
}

fn file_writer(log_dir: &Path) -> Result<NonBlocking> {
    std::fs::create_dir_all(log_dir)?;
    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = FILE_GUARD.set(guard);
    Ok(writer)
}

/// Daemon logging at `info` unless `MEDIADEX_LOG` says otherwise.
pub fn init(log_dir: Option<PathBuf>) -> Result<()> {
    #[cfg(target_os = "linux")]
    {
        if let Ok(journald) = tracing_journald::layer() {
            tracing_subscriber::registry()
                .with(filter("info"))
                .with(journald)
                .try_init()?;
            tracing::info!("Logging to journald");
            return Ok(());
        }
    }

    let log_dir = log_dir.unwrap_or_else(default_log_dir);
    let writer = file_writer(&log_dir)?;
    tracing_subscriber::registry()
        .with(filter("info"))
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()?;

    tracing::info!("Logging to {:?}", log_dir);
    Ok(())
}

/// Stderr logging for interactive commands, quiet below `warn` by default.
pub fn init_stderr() -> Result<()> {
    tracing_subscriber::registry()
        .with(filter("warn"))
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()?;
    Ok(())
}
