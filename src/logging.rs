// src/logging.rs

//! Logging setup for `dynadag` using `tracing` + `tracing-subscriber`.
//!
//! The filter is chosen in this order:
//! 1. `--log-level` CLI flag, applied to the `dynadag` target
//! 2. `DYNADAG_LOG`, either a bare level ("debug") or full directives such
//!    as `dynadag::promise=debug,dynadag::sched=trace`
//! 3. `dynadag=info`
//!
//! Other crates log at `warn` unless a directive says otherwise. Logs go to
//! STDERR; stdout carries the rendered snapshot only.

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

pub const LOG_ENV: &str = "DYNADAG_LOG";

/// Initialise global logging subscriber.
///
/// Call once at startup; tests use `dynadag_test_utils::init_tracing`
/// instead.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env = std::env::var(LOG_ENV).ok();
    let filter = EnvFilter::try_new(filter_directives(cli_level, env.as_deref()))?;

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to install logger: {e}"))
}

/// Directive string for [`EnvFilter`].
pub(crate) fn filter_directives(cli_level: Option<LogLevel>, env: Option<&str>) -> String {
    if let Some(lvl) = cli_level {
        return crate_directives(level_from_log_level(lvl));
    }
    match env.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => match parse_level_str(raw) {
            Some(level) => crate_directives(level),
            None if EnvFilter::try_new(raw).is_ok() => format!("warn,{raw}"),
            None => crate_directives(tracing::Level::INFO),
        },
        None => crate_directives(tracing::Level::INFO),
    }
}

fn crate_directives(level: tracing::Level) -> String {
    format!("warn,dynadag={}", level.as_str().to_lowercase())
}

fn level_from_log_level(lvl: LogLevel) -> tracing::Level {
    match lvl {
        LogLevel::Error => tracing::Level::ERROR,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Trace => tracing::Level::TRACE,
    }
}

pub(crate) fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_strings_are_case_insensitive() {
        assert_eq!(parse_level_str(" DEBUG "), Some(tracing::Level::DEBUG));
        assert_eq!(parse_level_str("warning"), Some(tracing::Level::WARN));
        assert_eq!(parse_level_str("loud"), None);
    }

    #[test]
    fn cli_flag_wins_over_environment() {
        assert_eq!(
            filter_directives(Some(LogLevel::Trace), Some("error")),
            "warn,dynadag=trace"
        );
    }

    #[test]
    fn environment_accepts_levels_and_module_directives() {
        assert_eq!(filter_directives(None, Some("debug")), "warn,dynadag=debug");
        assert_eq!(
            filter_directives(None, Some("dynadag::promise=debug")),
            "warn,dynadag::promise=debug"
        );
        assert_eq!(filter_directives(None, Some("")), "warn,dynadag=info");
        assert_eq!(filter_directives(None, None), "warn,dynadag=info");
    }
}
