//! Error types for gateway operations

use crate::proxy::ProxyHandle;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Unknown proxy handle: {handle}")]
    UnknownProxy { handle: ProxyHandle },

    #[error("No association for process: {process}")]
    NoAssociation { process: String },

    #[error("Proxy {handle} is still bound to {process}")]
    ProxyInUse { handle: ProxyHandle, process: String },

    #[error("Proxy handle space exhausted")]
    HandlesExhausted,

    #[error("Gateway is in error state, stop() is required before start()")]
    Faulted,

    #[error("Routing engine did not start within {timeout_ms} ms")]
    StartTimeout { timeout_ms: u64 },

    #[error("Routing engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid proxy endpoint: {endpoint}")]
    InvalidEndpoint { endpoint: String },

    #[error("Invalid proxy credentials: {reason}")]
    InvalidCredentials { reason: String },

    #[error("Invalid CIDR notation: {cidr}")]
    InvalidCidr { cidr: String },

    #[error("Invalid process name: {name:?}")]
    InvalidProcessName { name: String },

    #[error("Invalid setting {key}: {reason}")]
    InvalidSetting { key: String, reason: String },
}

/// Errors reported by a routing engine implementation
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Engine initialization failed: {0}")]
    Init(String),

    #[error("Engine rejected configuration: {0}")]
    Rejected(String),

    #[error("Engine IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
