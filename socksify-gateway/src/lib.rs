//! Control plane for a transparent per-process SOCKS5 gateway

pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod gateway;
pub mod log;
pub mod logging;
pub mod proxy;
pub mod routing;
pub mod status;

// Re-export commonly used types
pub use config::{GatewaySettings, SettingsLoader};
pub use engine::{DecisionEngineFactory, EngineFactory, EventSink, RoutingEngine};
pub use error::{EngineError, GatewayError, Result, ValidationError};
pub use filter::Route;
pub use gateway::Gateway;
pub use log::{GatewayEvent, LogEntry, LogPayload, LogSubscriber};
pub use logging::{init_tracing, LogLevel};
pub use proxy::{Protocol, ProxyConfig, ProxyHandle, SupportedProtocols};
pub use routing::{ProcessBinding, ProcessPolicy};
pub use status::GatewayStatus;
