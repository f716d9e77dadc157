//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports.
//!
//! Two kinds of backend sit behind these ports: a fast expiring key/value
//! cache holding ephemeral counters and cached resolutions, and durable
//! storage holding settings, overrides and view events.

use crate::domain::event::{EventObservation, ViewEvent};
use crate::domain::override_rule::{Override, OverrideQuery};
use crate::domain::settings::ThrottleSettings;
use std::fmt::Debug;
use std::time::{Duration, Instant, SystemTime};
use thiserror::Error;

/// Error reported by a cache backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The backend could not be reached or timed out
    #[error("cache unavailable: {0}")]
    Unavailable(String),
    /// A stored value could not be encoded or decoded
    #[error("cache codec error: {0}")]
    Codec(String),
    /// An increment hit a key holding a non-integer value
    #[error("cache key {0} does not hold a counter")]
    NotACounter(String),
}

/// Error reported by a storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backend could not be reached or timed out
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    /// A write lost a race it could not retry
    #[error("storage conflict: {0}")]
    Conflict(String),
}

/// Port for obtaining current time.
///
/// Monotonic time drives cache expiry; wall time drives override expiry and
/// event timestamps. Infrastructure provides `SystemClock` and `MockClock`.
pub trait Clock: Send + Sync + Debug {
    /// Get the current instant.
    fn now(&self) -> Instant;

    /// Get the current wall-clock time.
    fn wall_time(&self) -> SystemTime;
}

/// Port for the expiring key/value cache.
///
/// Implementations must make `add` and `incr` atomic per key: the boundary
/// behaviour of the view-count throttle and the event recorder depends on it.
pub trait Cache: Send + Sync + Debug {
    /// Read a value. Expired entries read as `None`.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Write a value with a time-to-live, replacing any existing entry.
    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError>;

    /// Write a value only if the key is absent.
    ///
    /// # Returns
    /// `true` if this call stored the value, `false` if a live entry existed.
    fn add(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool, CacheError>;

    /// Increment a counter, creating it at 1 with `ttl` if absent.
    ///
    /// The time-to-live is set only on creation; later increments do not
    /// extend it.
    ///
    /// # Returns
    /// The post-increment value.
    fn incr(&self, key: &str, ttl: Duration) -> Result<u64, CacheError>;

    /// Remove a key. Removing a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Port for reading the persisted settings record.
pub trait SettingsStore: Send + Sync + Debug {
    /// Load the single settings record, if one exists.
    fn load_settings(&self) -> Result<Option<ThrottleSettings>, StoreError>;
}

/// Port for reading administrator overrides.
pub trait OverrideStore: Send + Sync + Debug {
    /// Fetch overrides that may match `query`.
    ///
    /// Adapters may return a superset (for example, every override for the
    /// scope); the resolver applies the exact match itself.
    fn candidate_overrides(&self, query: &OverrideQuery<'_>) -> Result<Vec<Override>, StoreError>;
}

/// Port for the durable view-event aggregate.
pub trait EventStore: Send + Sync + Debug {
    /// Atomically fold an observation into the (scope, viewer) row.
    ///
    /// Creates the row with `count = 1` if it does not exist; otherwise
    /// increments `count` in place and overwrites `blocked` and `ip_hash`.
    fn upsert_event(
        &self,
        observation: &EventObservation<'_>,
        now: SystemTime,
    ) -> Result<ViewEvent, StoreError>;
}
