//! Logging setup.
//!
//! Logs go to a daily file `<data_dir>/logs/YYYY-MM-DD.log` so terminal
//! output stays clean. `--verbose` also copies them to stderr at debug
//! level. `REMEDY_LOG` overrides the filter (e.g.
//! `REMEDY_LOG=remedy_engine=debug`).

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "REMEDY_LOG";

/// Today's log file
pub fn log_path() -> PathBuf {
    remedy_engine::config::data_dir()
        .join("logs")
        .join(format!("{}.log", chrono::Local::now().format("%Y-%m-%d")))
}

pub fn init(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

    let path = log_path();
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false);
    if verbose {
        builder
            .with_writer(Mutex::new(file).and(std::io::stderr))
            .init();
    } else {
        builder.with_writer(Mutex::new(file)).init();
    }
    Ok(())
}
