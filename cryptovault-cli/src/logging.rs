//! Tracing subscriber setup.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// `--log-level` wins over `RUST_LOG`; `info` when neither is set.
fn filter(level: Option<&str>) -> Result<EnvFilter> {
    match level {
        Some(level) => EnvFilter::try_new(level)
            .with_context(|| format!("invalid log level '{level}'")),
        None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))),
    }
}

/// Console plus a fresh `cryptovault_<YYYYmmdd_HHMMSS>.log` under `logs_dir`.
/// Returns the log file path.
pub fn init_run_logging(level: Option<&str>, logs_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(logs_dir)
        .with_context(|| format!("creating logs directory {}", logs_dir.display()))?;
    let path = logs_dir.join(format!(
        "cryptovault_{}.log",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ));
    let file =
        File::create(&path).with_context(|| format!("creating log file {}", path.display()))?;

    tracing_subscriber::registry()
        .with(filter(level)?)
        .with(fmt::layer().with_target(false))
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .context("installing tracing subscriber")?;

    Ok(path)
}

/// Warnings and errors on stderr, for the read-only commands.
pub fn init_console_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init()
        .ok();
}
