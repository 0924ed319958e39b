//! Log entry types

use crate::logging::LogLevel;
use chrono::Utc;
use serde::Serialize;
use std::fmt;

/// Kind of gateway event attached to each log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GatewayEvent {
    Connected,
    Disconnected,
    Message,
    AddressError,
    NdisError,
}

impl GatewayEvent {
    /// Whether this event kind carries the numeric payload rather than text
    pub fn carries_data(self) -> bool {
        matches!(
            self,
            GatewayEvent::Connected | GatewayEvent::Disconnected | GatewayEvent::NdisError
        )
    }
}

/// Exactly one payload form per entry, chosen by event kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum LogPayload {
    Text(String),
    Data(u64),
}

impl fmt::Display for LogPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogPayload::Text(text) => f.write_str(text),
            LogPayload::Data(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    /// Wall-clock milliseconds since the Unix epoch
    pub timestamp: i64,
    pub level: LogLevel,
    pub event: GatewayEvent,
    pub payload: LogPayload,
}

impl LogEntry {
    pub fn message(level: LogLevel, text: impl Into<String>) -> Self {
        Self::stamped(level, GatewayEvent::Message, LogPayload::Text(text.into()))
    }

    pub fn connected(data: u64) -> Self {
        Self::stamped(LogLevel::Info, GatewayEvent::Connected, LogPayload::Data(data))
    }

    pub fn disconnected(data: u64) -> Self {
        Self::stamped(LogLevel::Info, GatewayEvent::Disconnected, LogPayload::Data(data))
    }

    pub fn address_error(text: impl Into<String>) -> Self {
        Self::stamped(
            LogLevel::Warning,
            GatewayEvent::AddressError,
            LogPayload::Text(text.into()),
        )
    }

    pub fn ndis_error(code: u64) -> Self {
        Self::stamped(LogLevel::Error, GatewayEvent::NdisError, LogPayload::Data(code))
    }

    fn stamped(level: LogLevel, event: GatewayEvent, payload: LogPayload) -> Self {
        Self {
            timestamp: Utc::now().timestamp_millis(),
            level,
            event,
            payload,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match &self.payload {
            LogPayload::Text(text) => Some(text),
            LogPayload::Data(_) => None,
        }
    }

    pub fn data(&self) -> Option<u64> {
        match self.payload {
            LogPayload::Data(value) => Some(value),
            LogPayload::Text(_) => None,
        }
    }
}
