//! Severity levels and tracing setup

use crate::log::LogEntry;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::EnvFilter;

/// Environment variable that overrides the tracing directive
pub const LOG_ENV: &str = "SOCKSIFY_LOG";

/// Ordered message severity.
///
/// A configured level admits every message at or below its own severity;
/// `All` admits everything. The discriminants match the values host
/// applications already pass around, so ordering follows them.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warning = 1,
    Info = 2,
    Debug = 4,
    #[default]
    All = 255,
}

impl LogLevel {
    /// Whether a message of severity `level` passes this filter
    pub fn allows(self, level: LogLevel) -> bool {
        level <= self
    }

    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warning => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::All => LevelFilter::TRACE,
        }
    }

    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(LogLevel::Error),
            1 => Some(LogLevel::Warning),
            2 => Some(LogLevel::Info),
            4 => Some(LogLevel::Debug),
            255 => Some(LogLevel::All),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Error => "error",
            LogLevel::Warning => "warning",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::All => "all",
        };
        f.write_str(name)
    }
}

/// Install a stderr `fmt` subscriber filtered at `level`.
///
/// `SOCKSIFY_LOG` takes precedence when set. Returns false if a global
/// subscriber was already installed.
pub fn init_tracing(level: LogLevel) -> bool {
    let filter = if std::env::var_os(LOG_ENV).is_some() {
        EnvFilter::from_env(LOG_ENV)
    } else {
        EnvFilter::from_default_env().add_directive(level.to_level_filter().into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

/// Echo a buffered entry to `tracing` at its own severity
pub(crate) fn mirror(entry: &LogEntry) {
    let event = entry.event;
    let payload = &entry.payload;
    match entry.level {
        LogLevel::Error => tracing::error!(?event, "{payload}"),
        LogLevel::Warning => tracing::warn!(?event, "{payload}"),
        LogLevel::Info => tracing::info!(?event, "{payload}"),
        LogLevel::Debug | LogLevel::All => tracing::debug!(?event, "{payload}"),
    }
}
