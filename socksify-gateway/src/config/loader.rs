//! Settings loading from the process environment

use super::schema::GatewaySettings;
use super::validator::SettingsValidator;
use std::env;
use std::str::FromStr;

pub const ENV_LOG_LIMIT: &str = "SOCKSIFY_LOG_LIMIT";
pub const ENV_LOG_INTERVAL_MS: &str = "SOCKSIFY_LOG_INTERVAL_MS";
pub const ENV_START_TIMEOUT_MS: &str = "SOCKSIFY_START_TIMEOUT_MS";
pub const ENV_STOP_TIMEOUT_MS: &str = "SOCKSIFY_STOP_TIMEOUT_MS";

pub struct SettingsLoader;

impl SettingsLoader {
    /// Defaults overridden by `SOCKSIFY_*` environment variables
    pub fn from_env() -> GatewaySettings {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each known key
    ///
    /// Unparseable values are ignored with a warning. If the merged result
    /// fails validation the defaults are returned unchanged.
    pub fn from_lookup<F>(lookup: F) -> GatewaySettings
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = GatewaySettings::default();
        let mut settings = defaults.clone();

        override_with(&lookup, ENV_LOG_LIMIT, &mut settings.log_limit);
        override_with(&lookup, ENV_LOG_INTERVAL_MS, &mut settings.log_event_interval_ms);
        override_with(&lookup, ENV_START_TIMEOUT_MS, &mut settings.engine_start_timeout_ms);
        override_with(&lookup, ENV_STOP_TIMEOUT_MS, &mut settings.engine_stop_timeout_ms);

        match SettingsValidator::validate(&settings) {
            Ok(()) => settings,
            Err(e) => {
                tracing::warn!("Ignoring environment settings: {e}");
                defaults
            }
        }
    }
}

fn override_with<F, T>(lookup: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = lookup(key) else {
        return;
    };

    match raw.trim().parse::<T>() {
        Ok(value) => *slot = value,
        Err(_) => tracing::warn!(key, value = %raw, "Ignoring unparseable setting"),
    }
}
