//! Settings validation

use super::schema::GatewaySettings;
use crate::error::{Result, ValidationError};

pub struct SettingsValidator;

impl SettingsValidator {
    /// Validate all settings
    pub fn validate(settings: &GatewaySettings) -> Result<()> {
        Self::require_nonzero("log_event_interval_ms", settings.log_event_interval_ms)?;
        Self::require_nonzero("engine_start_timeout_ms", settings.engine_start_timeout_ms)?;
        Self::require_nonzero("engine_stop_timeout_ms", settings.engine_stop_timeout_ms)?;
        Ok(())
    }

    fn require_nonzero(key: &str, value: u64) -> Result<()> {
        if value == 0 {
            return Err(ValidationError::InvalidSetting {
                key: key.to_string(),
                reason: "must be greater than zero".to_string(),
            }
            .into());
        }
        Ok(())
    }
}
