//! Tracing subscriber setup for the CLI.
//!
//! Priority order for the filter:
//! 1. `FEEDLINE_LOG` environment variable
//! 2. `log.level` from the config file
//! 3. `info`

use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogConfig;

/// Environment variable overriding the configured log filter.
pub const LOG_ENV: &str = "FEEDLINE_LOG";

/// Install the global subscriber.
///
/// Output goes through a non-blocking writer; keep the returned guard alive
/// until exit or buffered lines are lost.
pub fn init(config: &LogConfig) -> Result<WorkerGuard> {
  let filter = build_filter(config)?;

  let (writer, guard, ansi) = if config.stderr {
    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
    (writer, guard, true)
  } else {
    let path = config.file_path();
    let dir = path
      .parent()
      .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;
    let file_name = path
      .file_name()
      .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;
    std::fs::create_dir_all(dir)
      .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    (writer, guard, false)
  };

  tracing_subscriber::registry()
    .with(filter)
    .with(
      fmt::layer()
        .with_target(true)
        .with_ansi(ansi)
        .with_writer(writer),
    )
    .try_init()
    .map_err(|e| eyre!("Failed to install log subscriber: {}", e))?;

  Ok(guard)
}

fn build_filter(config: &LogConfig) -> Result<EnvFilter> {
  if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV) {
    return Ok(filter);
  }
  level_filter(&config.level)
}

fn level_filter(level: &str) -> Result<EnvFilter> {
  EnvFilter::try_new(level).map_err(|e| eyre!("Invalid log level '{}': {}", level, e))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_level_filter() {
    assert_eq!(level_filter("debug").unwrap().to_string(), "debug");
    assert!(level_filter("feedline=trace,warn").is_ok());
    assert!(level_filter("feedline=loudest").is_err());
  }
}
