//! Engine configuration.
//!
//! Loaded from TOML. Every field has a default, so an empty document is a
//! valid configuration:
//!
//! ```toml
//! namespace = "ads_throttle"
//! ip_header = "X_REAL_IP"
//! session_cookie_name = "sessionid"
//! settings_cache_ttl_secs = 300
//! override_cache_ttl_secs = 60
//! event_suppression = "per_viewer"
//!
//! [defaults]
//! view_repeat_window_seconds = 60
//! view_repeat_threshold = 5
//! block_seconds = 300
//! event_record_seconds = 60
//!
//! [breaker]
//! failure_threshold = 5
//! recovery_timeout_secs = 30
//! ```

use crate::application::circuit_breaker::BreakerConfig;
use crate::application::recorder::EventSuppression;
use crate::domain::fingerprint::{FingerprintRules, DEFAULT_SESSION_COOKIE};
use crate::domain::settings::{SettingsError, ThrottleSettings};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Error returned when configuration cannot be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<SettingsError> for ConfigError {
    fn from(e: SettingsError) -> Self {
        ConfigError::Invalid(format!("defaults: {}", e))
    }
}

/// Static configuration of an `AdsThrottle` engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Prefix of every cache key
    pub namespace: String,
    /// Header checked before the forwarded-for chain
    pub ip_header: Option<String>,
    pub session_cookie_name: String,
    pub settings_cache_ttl_secs: u64,
    pub override_cache_ttl_secs: u64,
    /// Used when no settings record is stored
    pub defaults: ThrottleSettings,
    pub event_suppression: EventSuppression,
    /// Guards event-store writes
    pub breaker: BreakerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            namespace: "ads_throttle".to_string(),
            ip_header: None,
            session_cookie_name: DEFAULT_SESSION_COOKIE.to_string(),
            settings_cache_ttl_secs: 300,
            override_cache_ttl_secs: 60,
            defaults: ThrottleSettings::default(),
            event_suppression: EventSuppression::default(),
            breaker: BreakerConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Read, parse and validate a TOML file.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::Invalid("namespace must not be empty".into()));
        }
        if self.session_cookie_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "session_cookie_name must not be empty".into(),
            ));
        }
        if self.settings_cache_ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "settings_cache_ttl_secs must be positive".into(),
            ));
        }
        if self.override_cache_ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "override_cache_ttl_secs must be positive".into(),
            ));
        }
        if self.breaker.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "breaker.failure_threshold must be positive".into(),
            ));
        }
        self.defaults.validate()?;
        Ok(())
    }

    pub fn settings_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.settings_cache_ttl_secs)
    }

    pub fn override_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.override_cache_ttl_secs)
    }

    pub fn fingerprint_rules(&self) -> FingerprintRules {
        FingerprintRules::new(self.ip_header.as_deref(), self.session_cookie_name.clone())
    }
}
