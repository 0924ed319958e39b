//! Settings schema types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for the gateway controller and its log aggregator
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GatewaySettings {
    /// Ring buffer capacity in entries
    #[serde(default = "default_log_limit")]
    pub log_limit: u32,
    /// Polling interval of the log aggregator
    #[serde(default = "default_log_event_interval_ms")]
    pub log_event_interval_ms: u64,
    /// Upper bound on routing engine initialization
    #[serde(default = "default_engine_timeout_ms")]
    pub engine_start_timeout_ms: u64,
    /// Upper bound on routing engine teardown
    #[serde(default = "default_engine_timeout_ms")]
    pub engine_stop_timeout_ms: u64,
}

fn default_log_limit() -> u32 {
    500
}

fn default_log_event_interval_ms() -> u64 {
    1000
}

fn default_engine_timeout_ms() -> u64 {
    5000
}

impl GatewaySettings {
    pub fn engine_start_timeout(&self) -> Duration {
        Duration::from_millis(self.engine_start_timeout_ms)
    }

    pub fn engine_stop_timeout(&self) -> Duration {
        Duration::from_millis(self.engine_stop_timeout_ms)
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            log_limit: default_log_limit(),
            log_event_interval_ms: default_log_event_interval_ms(),
            engine_start_timeout_ms: default_engine_timeout_ms(),
            engine_stop_timeout_ms: default_engine_timeout_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = GatewaySettings::default();
        assert_eq!(settings.log_limit, 500);
        assert_eq!(settings.log_event_interval_ms, 1000);
        assert_eq!(settings.engine_start_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_parse_embedded_table() {
        let toml_str = r#"
log_limit = 64
log_event_interval_ms = 250
"#;

        let settings: GatewaySettings = toml::from_str(toml_str).unwrap();
        assert_eq!(settings.log_limit, 64);
        assert_eq!(settings.log_event_interval_ms, 250);
        // Missing keys fall back to defaults
        assert_eq!(settings.engine_stop_timeout_ms, 5000);
    }
}
