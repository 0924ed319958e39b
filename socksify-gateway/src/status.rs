//! Gateway lifecycle status

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum GatewayStatus {
    Stopped = 0,
    Connected = 1,
    Disconnected = 2,
    Error = 3,
}

impl GatewayStatus {
    /// A session exists and its engine is healthy
    pub fn is_running(self) -> bool {
        matches!(self, GatewayStatus::Connected | GatewayStatus::Disconnected)
    }

    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => GatewayStatus::Connected,
            2 => GatewayStatus::Disconnected,
            3 => GatewayStatus::Error,
            _ => GatewayStatus::Stopped,
        }
    }
}

impl fmt::Display for GatewayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GatewayStatus::Stopped => "stopped",
            GatewayStatus::Connected => "connected",
            GatewayStatus::Disconnected => "disconnected",
            GatewayStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// Status readable without the controller lock
#[derive(Debug)]
pub(crate) struct StatusCell(AtomicU8);

impl StatusCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(GatewayStatus::Stopped as u8))
    }

    pub(crate) fn load(&self) -> GatewayStatus {
        GatewayStatus::from_raw(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, status: GatewayStatus) {
        self.0.store(status as u8, Ordering::Release);
    }

    /// Move to `to` only from one of `from`; returns whether it moved
    pub(crate) fn transition(&self, from: &[GatewayStatus], to: GatewayStatus) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                from.contains(&GatewayStatus::from_raw(raw)).then_some(to as u8)
            })
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_guards() {
        let cell = StatusCell::new();
        assert_eq!(cell.load(), GatewayStatus::Stopped);

        assert!(!cell.transition(&[GatewayStatus::Connected], GatewayStatus::Error));
        assert_eq!(cell.load(), GatewayStatus::Stopped);

        cell.store(GatewayStatus::Connected);
        assert!(cell.transition(&[GatewayStatus::Connected], GatewayStatus::Disconnected));
        assert_eq!(cell.load(), GatewayStatus::Disconnected);
        assert!(cell.load().is_running());
    }
}
