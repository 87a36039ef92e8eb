//! Subscriber setup for binaries embedding the scheduler.
//!
//! Library code logs through the `log` facade; the installed subscriber
//! also captures those records, so `log` and `tracing` output share one
//! formatter and one filter.

use tracing_log::AsTrace;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::LoggingError;

/// Parses a level name such as `info` or `DEBUG`.
pub fn parse_level(level: &str) -> Result<log::LevelFilter, LoggingError> {
    level
        .trim()
        .parse::<log::LevelFilter>()
        .map_err(|_| LoggingError::InvalidLevel(level.to_string()))
}

/// Filter with `config.level` as the default directive. `RUST_LOG`, when
/// set, takes precedence.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    let level = parse_level(&config.level)?;
    Ok(EnvFilter::builder()
        .with_default_directive(level.as_trace().into())
        .from_env_lossy())
}

/// Installs the global subscriber. A second call returns
/// `LoggingError::Init` and leaves the first subscriber in place.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = build_filter(config)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| LoggingError::Init(e.to_string()))?;

    log::debug!("Logging initialized at level {}", config.level);
    Ok(())
}
