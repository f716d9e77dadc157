//! Engine assembly.
//!
//! Wires configuration, backends and the clock into an `AdsThrottle`.
//! Backends left unset default to the in-process adapters, with one shared
//! `MemoryStore` serving every storage port.

use crate::application::circuit_breaker::{BreakerConfig, CircuitBreaker};
use crate::application::engine::AdsThrottle;
use crate::application::metrics::Metrics;
use crate::application::override_resolver::OverrideResolver;
use crate::application::ports::{Cache, Clock, EventStore, OverrideStore, SettingsStore};
use crate::application::recorder::{EventRecorder, EventSuppression};
use crate::application::settings_resolver::SettingsResolver;
use crate::application::throttle::ViewThrottle;
use crate::domain::keys::CacheKeys;
use crate::domain::settings::ThrottleSettings;
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::config::{ConfigError, EngineConfig};
use crate::infrastructure::memory_cache::MemoryCache;
use crate::infrastructure::memory_store::MemoryStore;
use std::sync::Arc;
use thiserror::Error;

/// Error returned when building an `AdsThrottle` fails.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Builder for `AdsThrottle`.
#[derive(Debug, Default)]
pub struct AdsThrottleBuilder {
    config: EngineConfig,
    cache: Option<Arc<dyn Cache>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    override_store: Option<Arc<dyn OverrideStore>>,
    event_store: Option<Arc<dyn EventStore>>,
    clock: Option<Arc<dyn Clock>>,
    metrics: Option<Metrics>,
}

impl AdsThrottleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Header to trust for the client IP before the forwarded-for chain.
    pub fn with_ip_header(mut self, header: impl Into<String>) -> Self {
        self.config.ip_header = Some(header.into());
        self
    }

    pub fn with_session_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.config.session_cookie_name = name.into();
        self
    }

    /// Settings used while no record is stored.
    pub fn with_defaults(mut self, defaults: ThrottleSettings) -> Self {
        self.config.defaults = defaults;
        self
    }

    pub fn with_event_suppression(mut self, suppression: EventSuppression) -> Self {
        self.config.event_suppression = suppression;
        self
    }

    pub fn with_breaker(mut self, breaker: BreakerConfig) -> Self {
        self.config.breaker = breaker;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    pub fn with_override_store(mut self, store: Arc<dyn OverrideStore>) -> Self {
        self.override_store = Some(store);
        self
    }

    pub fn with_event_store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.event_store = Some(store);
        self
    }

    /// Use one backend for every storage port.
    pub fn with_store<S>(self, store: Arc<S>) -> Self
    where
        S: SettingsStore + OverrideStore + EventStore + 'static,
    {
        self.with_settings_store(store.clone())
            .with_override_store(store.clone())
            .with_event_store(store)
    }

    /// Set a custom clock (for testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Share an existing metrics handle.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the engine.
    ///
    /// # Errors
    /// Returns `BuildError` if the configuration is invalid.
    pub fn build(self) -> Result<AdsThrottle, BuildError> {
        self.config.validate()?;

        let config = self.config;
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock::new()));
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(MemoryCache::new(clock.clone())));

        let mut fallback: Option<Arc<MemoryStore>> = None;
        let mut memory_store = || {
            fallback
                .get_or_insert_with(|| Arc::new(MemoryStore::with_clock(clock.clone())))
                .clone()
        };
        let settings_store: Arc<dyn SettingsStore> = match self.settings_store {
            Some(store) => store,
            None => memory_store(),
        };
        let override_store: Arc<dyn OverrideStore> = match self.override_store {
            Some(store) => store,
            None => memory_store(),
        };
        let event_store: Arc<dyn EventStore> = match self.event_store {
            Some(store) => store,
            None => memory_store(),
        };

        let metrics = self.metrics.unwrap_or_default();
        let keys = CacheKeys::new(config.namespace.clone());
        let breaker = Arc::new(CircuitBreaker::new(config.breaker, clock.clone()));

        let settings = SettingsResolver::new(
            cache.clone(),
            settings_store,
            &keys,
            config.settings_cache_ttl(),
            config.defaults,
            metrics.clone(),
        );
        let overrides = OverrideResolver::new(
            cache.clone(),
            override_store,
            clock.clone(),
            keys.clone(),
            config.override_cache_ttl(),
            metrics.clone(),
        );
        let throttle = ViewThrottle::new(cache.clone(), keys.clone());
        let recorder = EventRecorder::new(
            cache,
            event_store,
            clock,
            breaker,
            keys,
            config.event_suppression,
            metrics.clone(),
        );

        Ok(AdsThrottle::new(
            settings,
            overrides,
            throttle,
            recorder,
            config.fingerprint_rules(),
            metrics,
        ))
    }
}

impl AdsThrottle {
    /// Create a builder for configuring the engine.
    pub fn builder() -> AdsThrottleBuilder {
        AdsThrottleBuilder::new()
    }

    /// Build an engine from configuration with in-process backends.
    ///
    /// # Errors
    /// Returns `BuildError` if the configuration is invalid.
    pub fn from_config(config: EngineConfig) -> Result<Self, BuildError> {
        Self::builder().with_config(config).build()
    }
}
