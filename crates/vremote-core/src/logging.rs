//! Tracing integration for structured logging.
//!
//! Provides logging setup for the client library and CLI with:
//! - Configurable verbosity levels
//! - Optional file output
//! - JSON or text format

use std::path::Path;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::Result;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// Structured JSON output.
    Json,
}

/// Map a `-v` count to a filter level (0=error, 1=warn, 2=info, 3=debug, 4+=trace).
pub fn level_for_verbosity(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    }
}

/// Initialize the logging system.
///
/// `RUST_LOG`, when set, replaces the verbosity-derived filter.
///
/// # Example
///
/// ```ignore
/// use vremote_core::logging::{init_logging, LogFormat};
///
/// init_logging(3, None, LogFormat::Text).unwrap();
/// ```
pub fn init_logging(verbosity: u8, log_file: Option<&Path>, format: LogFormat) -> Result<()> {
    let level = level_for_verbosity(verbosity);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "vremote={},vremote_core={},vremote_client={}",
            level, level, level
        ))
    });

    let file = match log_file {
        Some(path) => Some(
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?,
        ),
        None => None,
    };

    let init = match (file, format) {
        (None, LogFormat::Text) => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_file(verbosity >= 3)
                    .with_line_number(verbosity >= 3),
            )
            .try_init(),
        (None, LogFormat::Json) => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        (Some(file), LogFormat::Text) => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::sync::Mutex::new(file))
                    .with_ansi(false)
                    .with_target(true)
                    .with_file(verbosity >= 3)
                    .with_line_number(verbosity >= 3),
            )
            .try_init(),
        (Some(file), LogFormat::Json) => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::sync::Mutex::new(file)))
            .try_init(),
    };

    init.map_err(|e| crate::Error::Io(std::io::Error::other(e.to_string())))
}

/// Initialize logging with defaults for testing.
///
/// Silently ignores errors (logging may already be initialized).
pub fn init_test_logging() {
    let _ = init_logging(3, None, LogFormat::Text);
}
