//! Tracing subscriber setup.
//!
//! Human-readable logs go to stderr so stdout stays clean for command
//! output (`mmrag query --json` is meant to be piped). When `logging.dir`
//! is set, a JSON copy of every event is also written to a daily-rolling
//! `mmrag.log` in that directory. `RUST_LOG` overrides the configured level.

use anyhow::{Context, Result};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

pub const LOG_FILE_PREFIX: &str = "mmrag.log";

/// Keeps the non-blocking file writer alive. Drop it only at exit, or
/// buffered log lines are lost.
pub struct LogGuard {
    _guard: Option<WorkerGuard>,
}

/// Install the global subscriber.
///
/// Fails if the level is invalid or the log directory cannot be created.
/// Calling it twice keeps the first subscriber.
pub fn init(config: &LoggingConfig) -> Result<LogGuard> {
    let default_level = parse_log_level(&config.level)?;

    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(env_filter.clone());

    let guard = if let Some(ref log_dir) = config.dir {
        std::fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;
        let file_appender = rolling::daily(log_dir, LOG_FILE_PREFIX);
        let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking_file)
            .with_ansi(false)
            .with_current_span(true)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_filter(env_filter);

        let _ = tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer)
            .try_init();
        Some(guard)
    } else {
        let _ = tracing_subscriber::registry().with(console_layer).try_init();
        None
    };

    tracing::debug!(
        level = %config.level,
        file_output = config.dir.is_some(),
        "logger initialized"
    );

    Ok(LogGuard { _guard: guard })
}

fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!("Invalid log level: {level}"),
    }
}
