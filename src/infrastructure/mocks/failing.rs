//! Backends that fail every call.
//!
//! Used to check that every decision path fails open when the cache or the
//! storage backend is down.

use crate::application::ports::{
    Cache, CacheError, EventStore, OverrideStore, SettingsStore, StoreError,
};
use crate::domain::event::{EventObservation, ViewEvent};
use crate::domain::override_rule::{Override, OverrideQuery};
use crate::domain::settings::ThrottleSettings;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

/// Cache whose every operation reports `CacheError::Unavailable`.
#[derive(Debug, Default)]
pub struct FailingCache {
    calls: AtomicU64,
}

impl FailingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of operations attempted against this cache.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn fail<T>(&self) -> Result<T, CacheError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Err(CacheError::Unavailable("connection refused".to_string()))
    }
}

impl Cache for FailingCache {
    fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.fail()
    }

    fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<(), CacheError> {
        self.fail()
    }

    fn add(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<bool, CacheError> {
        self.fail()
    }

    fn incr(&self, _key: &str, _ttl: Duration) -> Result<u64, CacheError> {
        self.fail()
    }

    fn delete(&self, _key: &str) -> Result<(), CacheError> {
        self.fail()
    }
}

/// Storage whose every read and write reports `StoreError::Unavailable`.
#[derive(Debug, Default)]
pub struct FailingStore {
    calls: AtomicU64,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of operations attempted against this store.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn fail<T>(&self) -> Result<T, StoreError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Err(StoreError::Unavailable("database is down".to_string()))
    }
}

impl SettingsStore for FailingStore {
    fn load_settings(&self) -> Result<Option<ThrottleSettings>, StoreError> {
        self.fail()
    }
}

impl OverrideStore for FailingStore {
    fn candidate_overrides(&self, _query: &OverrideQuery<'_>) -> Result<Vec<Override>, StoreError> {
        self.fail()
    }
}

impl EventStore for FailingStore {
    fn upsert_event(
        &self,
        _observation: &EventObservation<'_>,
        _now: SystemTime,
    ) -> Result<ViewEvent, StoreError> {
        self.fail()
    }
}
