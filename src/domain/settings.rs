//! Site-wide throttling parameters.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Error returned when throttling parameters are invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    /// Every parameter must be a positive integer
    #[error("{field} must be greater than 0")]
    NonPositive {
        /// Name of the offending field
        field: &'static str,
    },
}

/// Throttling parameters resolved for every decision.
///
/// At most one persisted record exists. When none does, the engine falls
/// back to the static defaults from its configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleSettings {
    /// Length of the view-counting window in seconds
    pub view_repeat_window_seconds: u64,
    /// Views allowed within the window before blocking
    pub view_repeat_threshold: u64,
    /// How long a tripped viewer stays blocked, in seconds
    pub block_seconds: u64,
    /// Minimum spacing between durable event writes per viewer, in seconds
    pub event_record_seconds: u64,
}

impl ThrottleSettings {
    /// Create validated settings.
    ///
    /// # Errors
    /// Returns `SettingsError::NonPositive` naming the first zero field.
    pub fn new(
        view_repeat_window_seconds: u64,
        view_repeat_threshold: u64,
        block_seconds: u64,
        event_record_seconds: u64,
    ) -> Result<Self, SettingsError> {
        let settings = Self {
            view_repeat_window_seconds,
            view_repeat_threshold,
            block_seconds,
            event_record_seconds,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Check that every field is positive.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let fields = [
            ("view_repeat_window_seconds", self.view_repeat_window_seconds),
            ("view_repeat_threshold", self.view_repeat_threshold),
            ("block_seconds", self.block_seconds),
            ("event_record_seconds", self.event_record_seconds),
        ];
        match fields.into_iter().find(|(_, value)| *value == 0) {
            Some((field, _)) => Err(SettingsError::NonPositive { field }),
            None => Ok(()),
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.view_repeat_window_seconds)
    }

    pub fn threshold(&self) -> u64 {
        self.view_repeat_threshold
    }

    pub fn block_duration(&self) -> Duration {
        Duration::from_secs(self.block_seconds)
    }

    pub fn event_record_window(&self) -> Duration {
        Duration::from_secs(self.event_record_seconds)
    }
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            view_repeat_window_seconds: 60,
            view_repeat_threshold: 5,
            block_seconds: 300,
            event_record_seconds: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(ThrottleSettings::default().validate().is_ok());
    }

    #[test]
    fn test_zero_field_rejected() {
        assert_eq!(
            ThrottleSettings::new(60, 0, 60, 60),
            Err(SettingsError::NonPositive {
                field: "view_repeat_threshold"
            })
        );
        assert_eq!(
            ThrottleSettings::new(60, 1, 60, 0),
            Err(SettingsError::NonPositive {
                field: "event_record_seconds"
            })
        );
    }

    #[test]
    fn test_durations() {
        let settings = ThrottleSettings::new(123, 7, 321, 11).unwrap();
        assert_eq!(settings.window(), Duration::from_secs(123));
        assert_eq!(settings.threshold(), 7);
        assert_eq!(settings.block_duration(), Duration::from_secs(321));
        assert_eq!(settings.event_record_window(), Duration::from_secs(11));
    }
}
