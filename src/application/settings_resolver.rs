//! Cached resolution of the site-wide throttling settings.
//!
//! The persisted record is read at most once per cache TTL. When no record
//! exists the static defaults are returned and nothing is cached, so a
//! record created later is picked up on the next call.

use crate::application::metrics::Metrics;
use crate::application::ports::{Cache, SettingsStore};
use crate::domain::keys::CacheKeys;
use crate::domain::settings::ThrottleSettings;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Resolves `ThrottleSettings` through the cache.
#[derive(Debug, Clone)]
pub struct SettingsResolver {
    cache: Arc<dyn Cache>,
    store: Arc<dyn SettingsStore>,
    key: String,
    ttl: Duration,
    defaults: ThrottleSettings,
    metrics: Metrics,
}

impl SettingsResolver {
    pub fn new(
        cache: Arc<dyn Cache>,
        store: Arc<dyn SettingsStore>,
        keys: &CacheKeys,
        ttl: Duration,
        defaults: ThrottleSettings,
        metrics: Metrics,
    ) -> Self {
        Self {
            cache,
            store,
            key: keys.settings(),
            ttl,
            defaults,
            metrics,
        }
    }

    /// Resolve the current settings.
    ///
    /// Never fails: cache and store errors are logged and fall back to the
    /// static defaults.
    pub fn get_settings(&self) -> ThrottleSettings {
        if let Some(settings) = self.cached() {
            return settings;
        }

        match self.store.load_settings() {
            Ok(Some(settings)) => match settings.validate() {
                Ok(()) => {
                    self.populate(&settings);
                    settings
                }
                Err(e) => {
                    warn!(error = %e, "Ignoring invalid persisted throttle settings");
                    self.defaults
                }
            },
            Ok(None) => self.defaults,
            Err(e) => {
                self.metrics.record_backend_error();
                warn!(error = %e, "Failed to load throttle settings, using defaults");
                self.defaults
            }
        }
    }

    /// Drop the cached settings so the next call re-reads storage.
    ///
    /// Called by whatever administers the settings record after a change.
    pub fn invalidate(&self) {
        if let Err(e) = self.cache.delete(&self.key) {
            self.metrics.record_backend_error();
            warn!(error = %e, key = %self.key, "Failed to invalidate cached settings");
        }
    }

    /// Static fallback used when no record exists.
    pub fn defaults(&self) -> &ThrottleSettings {
        &self.defaults
    }

    fn cached(&self) -> Option<ThrottleSettings> {
        let bytes = match self.cache.get(&self.key) {
            Ok(bytes) => bytes?,
            Err(e) => {
                self.metrics.record_backend_error();
                warn!(error = %e, key = %self.key, "Settings cache read failed, treating as miss");
                return None;
            }
        };

        match bincode::deserialize::<ThrottleSettings>(&bytes) {
            Ok(settings) if settings.validate().is_ok() => Some(settings),
            _ => {
                warn!(key = %self.key, "Discarding unreadable cached settings");
                // The next populate overwrites the entry even if this fails
                if let Err(e) = self.cache.delete(&self.key) {
                    self.metrics.record_backend_error();
                    warn!(error = %e, key = %self.key, "Failed to delete unreadable cached settings");
                }
                None
            }
        }
    }

    fn populate(&self, settings: &ThrottleSettings) {
        let bytes = match bincode::serialize(settings) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Failed to encode throttle settings for caching");
                return;
            }
        };
        if let Err(e) = self.cache.set(&self.key, &bytes, self.ttl) {
            self.metrics.record_backend_error();
            warn!(error = %e, key = %self.key, "Failed to cache throttle settings");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::memory_cache::MemoryCache;
    use crate::infrastructure::memory_store::MemoryStore;
    use crate::application::ports::CacheError;
    use crate::infrastructure::mocks::{FailingCache, FailingStore, MockClock};

    /// Serves a garbage settings entry and refuses every write.
    #[derive(Debug)]
    struct GarbageCache;

    impl Cache for GarbageCache {
        fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            Ok(Some(b"garbage".to_vec()))
        }

        fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("read-only".to_string()))
        }

        fn add(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<bool, CacheError> {
            Err(CacheError::Unavailable("read-only".to_string()))
        }

        fn incr(&self, _key: &str, _ttl: Duration) -> Result<u64, CacheError> {
            Err(CacheError::Unavailable("read-only".to_string()))
        }

        fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("read-only".to_string()))
        }
    }

    struct Fixture {
        cache: Arc<MemoryCache>,
        store: Arc<MemoryStore>,
        clock: MockClock,
        resolver: SettingsResolver,
    }

    fn fixture() -> Fixture {
        let clock = MockClock::default();
        let cache = Arc::new(MemoryCache::new(Arc::new(clock.clone())));
        let store = Arc::new(MemoryStore::new());
        let resolver = SettingsResolver::new(
            cache.clone(),
            store.clone(),
            &CacheKeys::default(),
            Duration::from_secs(60),
            ThrottleSettings::new(111, 7, 99, 12).unwrap(),
            Metrics::new(),
        );
        Fixture {
            cache,
            store,
            clock,
            resolver,
        }
    }

    #[test]
    fn test_falls_back_to_defaults_without_record() {
        let f = fixture();
        let settings = f.resolver.get_settings();
        assert_eq!(settings, ThrottleSettings::new(111, 7, 99, 12).unwrap());
        // Absence is not cached
        assert_eq!(f.cache.get("ads_throttle:settings").unwrap(), None);
    }

    #[test]
    fn test_prefers_persisted_record_and_caches_it() {
        let f = fixture();
        let stored = ThrottleSettings::new(555, 9, 321, 33).unwrap();
        f.store.put_settings(Some(stored));

        assert_eq!(f.resolver.get_settings(), stored);
        let cached = f.cache.get("ads_throttle:settings").unwrap().unwrap();
        assert_eq!(bincode::deserialize::<ThrottleSettings>(&cached).unwrap(), stored);
    }

    #[test]
    fn test_cache_hit_skips_storage() {
        let f = fixture();
        f.store
            .put_settings(Some(ThrottleSettings::new(1, 2, 3, 4).unwrap()));
        f.resolver.get_settings();
        let reads = f.store.reads();

        // Storage changes are invisible until the entry expires
        f.store
            .put_settings(Some(ThrottleSettings::new(5, 6, 7, 8).unwrap()));
        assert_eq!(
            f.resolver.get_settings(),
            ThrottleSettings::new(1, 2, 3, 4).unwrap()
        );
        assert_eq!(f.store.reads(), reads);

        f.clock.advance(Duration::from_secs(61));
        assert_eq!(
            f.resolver.get_settings(),
            ThrottleSettings::new(5, 6, 7, 8).unwrap()
        );
    }

    #[test]
    fn test_invalidate_forces_reload() {
        let f = fixture();
        f.store
            .put_settings(Some(ThrottleSettings::new(1, 2, 3, 4).unwrap()));
        f.resolver.get_settings();

        f.store
            .put_settings(Some(ThrottleSettings::new(5, 6, 7, 8).unwrap()));
        f.resolver.invalidate();
        assert_eq!(
            f.resolver.get_settings(),
            ThrottleSettings::new(5, 6, 7, 8).unwrap()
        );
    }

    #[test]
    fn test_invalid_record_uses_defaults() {
        let f = fixture();
        f.store.put_settings(Some(ThrottleSettings {
            view_repeat_window_seconds: 0,
            ..ThrottleSettings::default()
        }));
        assert_eq!(f.resolver.get_settings(), *f.resolver.defaults());
    }

    #[test]
    fn test_corrupt_cache_entry_is_replaced() {
        let f = fixture();
        let stored = ThrottleSettings::new(10, 20, 30, 40).unwrap();
        f.store.put_settings(Some(stored));
        f.cache
            .set("ads_throttle:settings", b"garbage", Duration::from_secs(60))
            .unwrap();

        assert_eq!(f.resolver.get_settings(), stored);
    }

    #[test]
    fn test_backend_failures_fall_back_to_defaults() {
        let metrics = Metrics::new();
        let resolver = SettingsResolver::new(
            Arc::new(FailingCache::new()),
            Arc::new(FailingStore::new()),
            &CacheKeys::default(),
            Duration::from_secs(60),
            ThrottleSettings::default(),
            metrics.clone(),
        );
        assert_eq!(resolver.get_settings(), ThrottleSettings::default());
        assert_eq!(metrics.backend_errors(), 2);
    }

    #[test]
    fn test_failed_delete_of_corrupt_entry_is_counted() {
        let metrics = Metrics::new();
        let store = Arc::new(MemoryStore::new());
        let stored = ThrottleSettings::new(10, 20, 30, 40).unwrap();
        store.put_settings(Some(stored));
        let resolver = SettingsResolver::new(
            Arc::new(GarbageCache),
            store,
            &CacheKeys::default(),
            Duration::from_secs(60),
            ThrottleSettings::default(),
            metrics.clone(),
        );

        assert_eq!(resolver.get_settings(), stored);
        // Failed delete, then failed populate
        assert_eq!(metrics.backend_errors(), 2);
    }
}
