//! Seam to the routing engine that intercepts and redirects traffic
//!
//! The gateway never captures packets itself. It drives an engine through
//! [`RoutingEngine`], creating a fresh instance per session via an
//! [`EngineFactory`] and dropping it on stop. Engines report activity back
//! through the [`EventSink`] they are created with.

pub mod decision;

use crate::error::EngineError;
use crate::filter::Route;
use crate::log::{GatewayEvent, LogBuffer, LogEntry};
use crate::logging::{self, LogLevel};
use crate::proxy::{Protocol, ProxyConfig, ProxyHandle};
use crate::routing::ProcessName;
use crate::status::{GatewayStatus, StatusCell};
use ipnet::IpNet;
use std::net::IpAddr;
use std::sync::Arc;

pub use decision::{DecisionEngine, DecisionEngineFactory};

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Configuration and lifecycle surface of a routing engine.
///
/// Every method is called with the gateway lock held, so calls are
/// serialized. Configuration pushed after `start` must take effect before
/// the method returns.
pub trait RoutingEngine: Send {
    /// Acquire network resources and begin intercepting
    fn start(&mut self) -> EngineResult<()>;

    /// Release everything acquired by `start`
    fn stop(&mut self);

    /// Destinations that always connect directly
    fn set_bypass_ranges(&mut self, ranges: &[IpNet]) -> EngineResult<()>;

    fn add_proxy(&mut self, handle: ProxyHandle, config: &ProxyConfig) -> EngineResult<()>;

    fn remove_proxy(&mut self, handle: ProxyHandle) -> EngineResult<()>;

    fn associate_process(&mut self, process: &ProcessName, proxy: ProxyHandle) -> EngineResult<()>;

    fn exclude_process(&mut self, process: &ProcessName) -> EngineResult<()>;

    fn include_destination(&mut self, process: &ProcessName, cidr: IpNet) -> EngineResult<()>;

    fn remove_destination(&mut self, process: &ProcessName, cidr: IpNet) -> EngineResult<()>;

    /// Route the engine would pick for a new flow, if it can answer that
    fn route(
        &self,
        _process: &ProcessName,
        _destination: IpAddr,
        _protocol: Protocol,
    ) -> Option<Route> {
        None
    }
}

/// Builds one engine per gateway session
pub trait EngineFactory: Send + Sync {
    fn create(&self, events: EventSink) -> EngineResult<Box<dyn RoutingEngine>>;
}

impl<F> EngineFactory for F
where
    F: Fn(EventSink) -> EngineResult<Box<dyn RoutingEngine>> + Send + Sync,
{
    fn create(&self, events: EventSink) -> EngineResult<Box<dyn RoutingEngine>> {
        self(events)
    }
}

/// Handle through which engines (and the gateway itself) append log
/// entries and report health changes.
///
/// Text messages are filtered by the gateway's log level; lifecycle and
/// error events are always recorded. Appends are mirrored to `tracing`
/// and never block on the log consumer.
#[derive(Debug, Clone)]
pub struct EventSink {
    buffer: Arc<LogBuffer>,
    status: Arc<StatusCell>,
    level: LogLevel,
}

impl EventSink {
    pub(crate) fn new(buffer: Arc<LogBuffer>, status: Arc<StatusCell>, level: LogLevel) -> Self {
        Self {
            buffer,
            status,
            level,
        }
    }

    pub fn emit(&self, entry: LogEntry) {
        if entry.event == GatewayEvent::Message && !self.level.allows(entry.level) {
            return;
        }
        logging::mirror(&entry);
        self.buffer.push(entry);
    }

    pub fn message(&self, level: LogLevel, text: impl Into<String>) {
        self.emit(LogEntry::message(level, text));
    }

    pub fn connected(&self, data: u64) {
        self.emit(LogEntry::connected(data));
    }

    pub fn disconnected(&self, data: u64) {
        self.emit(LogEntry::disconnected(data));
    }

    pub fn address_error(&self, text: impl Into<String>) {
        self.emit(LogEntry::address_error(text));
    }

    pub fn ndis_error(&self, code: u64) {
        self.emit(LogEntry::ndis_error(code));
    }

    /// The engine can no longer route traffic. Moves a running gateway to
    /// `Error`; recovery takes an explicit stop/start cycle.
    pub fn fault(&self, reason: impl Into<String>) {
        let reason = reason.into();
        if self.status.transition(
            &[GatewayStatus::Connected, GatewayStatus::Disconnected],
            GatewayStatus::Error,
        ) {
            self.message(LogLevel::Error, format!("Routing engine fault: {reason}"));
        }
    }

    /// Upstream reachability changed while running
    pub fn link_state(&self, up: bool) {
        let moved = if up {
            self.status
                .transition(&[GatewayStatus::Disconnected], GatewayStatus::Connected)
        } else {
            self.status
                .transition(&[GatewayStatus::Connected], GatewayStatus::Disconnected)
        };

        if moved {
            let text = if up { "Upstream link restored" } else { "Upstream link lost" };
            self.message(LogLevel::Warning, text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink(level: LogLevel) -> (EventSink, Arc<LogBuffer>, Arc<StatusCell>) {
        let buffer = Arc::new(LogBuffer::new(16));
        let status = Arc::new(StatusCell::new());
        (EventSink::new(buffer.clone(), status.clone(), level), buffer, status)
    }

    #[test]
    fn test_level_filters_messages_only() {
        let (events, buffer, _) = sink(LogLevel::Error);
        events.message(LogLevel::Debug, "chatty");
        events.message(LogLevel::Warning, "careful");
        events.message(LogLevel::Error, "broken");
        events.connected(1);
        events.address_error("no route to 203.0.113.9");
        events.ndis_error(31);
        events.disconnected(1);

        let drained = buffer.drain();
        let kinds: Vec<GatewayEvent> = drained.iter().map(|e| e.event).collect();
        assert_eq!(
            kinds,
            vec![
                GatewayEvent::Message,
                GatewayEvent::Connected,
                GatewayEvent::AddressError,
                GatewayEvent::NdisError,
                GatewayEvent::Disconnected,
            ]
        );
        assert_eq!(drained[0].description(), Some("broken"));
    }

    #[test]
    fn test_fault_only_when_running() {
        let (events, buffer, status) = sink(LogLevel::All);
        events.fault("driver unloaded");
        assert_eq!(status.load(), GatewayStatus::Stopped);
        assert!(buffer.is_empty());

        status.store(GatewayStatus::Connected);
        events.fault("driver unloaded");
        assert_eq!(status.load(), GatewayStatus::Error);
        assert_eq!(buffer.len(), 1);

        // Error is sticky until stop()
        events.link_state(true);
        assert_eq!(status.load(), GatewayStatus::Error);
    }

    #[test]
    fn test_link_state_transitions() {
        let (events, _, status) = sink(LogLevel::All);
        status.store(GatewayStatus::Connected);

        events.link_state(false);
        assert_eq!(status.load(), GatewayStatus::Disconnected);
        events.link_state(true);
        assert_eq!(status.load(), GatewayStatus::Connected);
    }
}
