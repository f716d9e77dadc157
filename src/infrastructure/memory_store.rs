//! In-process durable storage.
//!
//! Holds the settings record, administrator overrides and the view-event
//! aggregate for single-process deployments and tests. The same type serves
//! all three storage ports.

use crate::application::ports::{Clock, EventStore, OverrideStore, SettingsStore, StoreError};
use crate::domain::event::{EventObservation, ViewEvent};
use crate::domain::override_rule::{
    Override, OverrideDecision, OverrideError, OverrideId, OverrideQuery, OverrideTarget,
};
use crate::domain::settings::ThrottleSettings;
use crate::infrastructure::clock::SystemClock;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

/// Thread-safe storage backed by DashMap.
///
/// Event upserts run under the shard lock of their (scope, viewer) row, so
/// concurrent observations never lose an increment.
#[derive(Debug)]
pub struct MemoryStore {
    settings: RwLock<Option<ThrottleSettings>>,
    overrides: DashMap<OverrideId, Override, ahash::RandomState>,
    events: DashMap<(String, String), ViewEvent, ahash::RandomState>,
    next_id: AtomicU64,
    reads: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Create an empty store stamping records with system time.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    /// Create an empty store stamping records with `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            settings: RwLock::new(None),
            overrides: DashMap::with_hasher(ahash::RandomState::new()),
            events: DashMap::with_hasher(ahash::RandomState::new()),
            next_id: AtomicU64::new(1),
            reads: AtomicU64::new(0),
            clock,
        }
    }

    /// Replace the settings record. `None` deletes it.
    pub fn put_settings(&self, settings: Option<ThrottleSettings>) {
        *self
            .settings
            .write()
            .unwrap_or_else(PoisonError::into_inner) = settings;
    }

    /// Create and store an override with a fresh id.
    ///
    /// # Errors
    /// Returns `OverrideError::InvalidScope` for a malformed scope.
    pub fn create_override(
        &self,
        scope: &str,
        target: OverrideTarget,
        decision: OverrideDecision,
        expires_at: Option<SystemTime>,
    ) -> Result<Override, OverrideError> {
        let id = OverrideId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let rule = Override::new(
            id,
            scope,
            target,
            decision,
            expires_at,
            self.clock.wall_time(),
        )?;
        self.overrides.insert(id, rule.clone());
        Ok(rule)
    }

    /// Store a prebuilt override, replacing any with the same id.
    pub fn insert_override(&self, rule: Override) {
        self.next_id.fetch_max(rule.id().0 + 1, Ordering::Relaxed);
        self.overrides.insert(rule.id(), rule);
    }

    pub fn remove_override(&self, id: OverrideId) -> Option<Override> {
        self.overrides.remove(&id).map(|(_, rule)| rule)
    }

    /// Current aggregate row for a (scope, viewer) pair.
    pub fn event(&self, scope: &str, viewer_id: &str) -> Option<ViewEvent> {
        self.events
            .get(&(scope.to_string(), viewer_id.to_string()))
            .map(|row| row.value().clone())
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Number of settings and override reads served so far.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn reset_reads(&self) {
        self.reads.store(0, Ordering::Relaxed);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsStore for MemoryStore {
    fn load_settings(&self) -> Result<Option<ThrottleSettings>, StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(*self.settings.read().unwrap_or_else(PoisonError::into_inner))
    }
}

impl OverrideStore for MemoryStore {
    fn candidate_overrides(&self, query: &OverrideQuery<'_>) -> Result<Vec<Override>, StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .overrides
            .iter()
            .filter(|rule| rule.covers_scope(query.scope))
            .map(|rule| rule.value().clone())
            .collect())
    }
}

impl EventStore for MemoryStore {
    fn upsert_event(
        &self,
        observation: &EventObservation<'_>,
        now: SystemTime,
    ) -> Result<ViewEvent, StoreError> {
        let key = (
            observation.scope.to_string(),
            observation.viewer_id.to_string(),
        );
        let row = self
            .events
            .entry(key)
            .and_modify(|row| row.apply(observation, now))
            .or_insert_with(|| ViewEvent::first(observation, now));
        Ok(row.value().clone())
    }
}
