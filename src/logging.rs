//! File logging. The terminal belongs to the TUI, so tracing output goes to a
//! daily rolling file under the user data directory.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_FILE_PREFIX: &str = "glyphreel.log";
const DEFAULT_FILTER: &str = "glyphreel=debug,warn";

/// `<data dir>/logs`, or `./.logs` when no home directory is known.
pub fn log_dir() -> PathBuf {
  ProjectDirs::from("", "", "glyphreel")
    .map(|dirs| dirs.data_dir().join("logs"))
    .unwrap_or_else(|| PathBuf::from(".logs"))
}

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init_logging() -> Result<PathBuf> {
  let dir = log_dir();
  std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create log directory {}", dir.display()))?;

  let appender = RollingFileAppender::new(Rotation::DAILY, &dir, LOG_FILE_PREFIX);
  let (writer, guard) = tracing_appender::non_blocking(appender);
  // The guard flushes on drop; it must live as long as the process.
  Box::leak(Box::new(guard));

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
  let layer = fmt::layer().with_writer(writer).with_ansi(false).with_target(true);

  tracing_subscriber::registry().with(filter).with(layer).try_init().context("Failed to install log subscriber")?;
  tracing::info!(dir = %dir.display(), version = env!("CARGO_PKG_VERSION"), "logging initialised");
  Ok(dir)
}
