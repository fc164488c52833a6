//! Structured logging.
//!
//! # Responsibilities
//! - Translate lnd style debug levels into `EnvFilter` directives
//! - Install the subscriber: console plus a rolling log file
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - `RUST_LOG` overrides the configured level when set
//! - The file writer is non-blocking; its guard must outlive the process

use std::io;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::error::ConfigError;
use crate::config::paths::make_directories;
use crate::config::schema::LogSettings;

const LEVELS: [&str; 7] = ["trace", "debug", "info", "warn", "error", "critical", "off"];

/// Parse a level string such as `info` or `debug,litd_gateway::net=trace`
/// into `EnvFilter` directives.
///
/// `critical` maps to `error`. At most one global level may be given.
pub fn parse_debug_level(level: &str) -> Result<String, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidLogLevel {
        level: level.to_string(),
        reason,
    };

    let mut global: Option<&str> = None;
    let mut directives = Vec::new();

    for part in level.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('=') {
            None => {
                if global.is_some() {
                    return Err(invalid("more than one global level".into()));
                }
                global = Some(map_level(part).ok_or_else(|| invalid(format!("unknown level {part:?}")))?);
            }
            Some((subsystem, lvl)) => {
                let subsystem = subsystem.trim();
                let valid_name = !subsystem.is_empty()
                    && subsystem
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':' || c == '-');
                if !valid_name {
                    return Err(invalid(format!("invalid subsystem {subsystem:?}")));
                }
                let lvl = lvl.trim();
                let mapped = map_level(lvl).ok_or_else(|| invalid(format!("unknown level {lvl:?}")))?;
                directives.push(format!("{}={}", subsystem.to_ascii_lowercase(), mapped));
            }
        }
    }

    let mut out = vec![global.unwrap_or("info").to_string()];
    out.extend(directives);
    Ok(out.join(","))
}

fn map_level(level: &str) -> Option<&'static str> {
    let lower = level.to_ascii_lowercase();
    LEVELS.iter().find(|l| **l == lower).map(|l| match *l {
        "critical" => "error",
        other => other,
    })
}

/// Error installing the logging backend.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("log rotation setup failed: {0}")]
    Rotation(String),

    #[error("log directory unusable: {0}")]
    Directory(#[from] ConfigError),

    #[error("invalid log filter: {0}")]
    Filter(String),

    #[error("logger already installed: {0}")]
    AlreadyInstalled(String),
}

/// Keeps the background log writer alive.
pub struct LogGuard {
    _guard: WorkerGuard,
}

/// Build the rolling file writer for `settings`.
///
/// With `max_files == 0` the file is never rotated.
pub fn file_appender(settings: &LogSettings) -> Result<RollingFileAppender, LoggingError> {
    make_directories(&settings.dir)?;

    if settings.max_files == 0 {
        return Ok(tracing_appender::rolling::never(&settings.dir, &settings.filename));
    }

    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(&settings.filename)
        .max_log_files(settings.max_files)
        .build(&settings.dir)
        .map_err(|e| LoggingError::Rotation(e.to_string()))
}

/// Install the global subscriber: console output plus the rolling file.
pub fn init(settings: &LogSettings) -> Result<LogGuard, LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&settings.filter)
            .map_err(|e| LoggingError::Filter(e.to_string()))?,
    };

    let (writer, guard) = tracing_appender::non_blocking(file_appender(settings)?);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .try_init()
        .map_err(|e| LoggingError::AlreadyInstalled(e.to_string()))?;

    tracing::debug!(
        log_file = %settings.file_path().display(),
        max_files = settings.max_files,
        filter = %settings.filter,
        "Logging initialized"
    );

    Ok(LogGuard { _guard: guard })
}
