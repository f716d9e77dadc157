//! Rate-limited recording of view events.
//!
//! Every decision produces an observation, but only the first observation
//! per (scope, viewer) within the suppression window reaches durable
//! storage. The window is a cache test-and-set: the first caller stores the
//! flag and records, later callers find it and skip.

use crate::application::circuit_breaker::CircuitBreaker;
use crate::application::metrics::Metrics;
use crate::application::ports::{Cache, CacheError, Clock, EventStore, StoreError};
use crate::domain::event::{EventObservation, ViewEvent};
use crate::domain::keys::CacheKeys;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const SUPPRESSION_FLAG: &[u8] = b"1";

/// How the suppression window is keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSuppression {
    /// One window per (scope, viewer). A block that follows a show within
    /// the window is not recorded.
    #[default]
    PerViewer,
    /// One window per (scope, viewer, outcome). The first block after a
    /// show is recorded even inside the show's window.
    PerOutcome,
}

/// What happened to an observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Written to storage; carries the updated row
    Recorded(ViewEvent),
    /// Inside the suppression window
    Suppressed,
    /// Dropped because the event store circuit is open
    Skipped,
}

/// Records view events behind a suppression window and a circuit breaker.
#[derive(Debug, Clone)]
pub struct EventRecorder {
    cache: Arc<dyn Cache>,
    store: Arc<dyn EventStore>,
    clock: Arc<dyn Clock>,
    breaker: Arc<CircuitBreaker>,
    keys: CacheKeys,
    suppression: EventSuppression,
    metrics: Metrics,
}

impl EventRecorder {
    pub fn new(
        cache: Arc<dyn Cache>,
        store: Arc<dyn EventStore>,
        clock: Arc<dyn Clock>,
        breaker: Arc<CircuitBreaker>,
        keys: CacheKeys,
        suppression: EventSuppression,
        metrics: Metrics,
    ) -> Self {
        Self {
            cache,
            store,
            clock,
            breaker,
            keys,
            suppression,
            metrics,
        }
    }

    /// Test-and-set the suppression flag.
    ///
    /// Returns `true` only for the first caller within `window`.
    pub fn should_record_event(
        &self,
        scope: &str,
        viewer_id: &str,
        blocked: bool,
        window: Duration,
    ) -> Result<bool, CacheError> {
        let key = self.suppression_key(scope, viewer_id, blocked);
        self.cache.add(&key, SUPPRESSION_FLAG, window)
    }

    /// Upsert the durable aggregate for an observation, unconditionally.
    ///
    /// Returns `Ok(None)` when the breaker is open and the write was skipped.
    pub fn record_event(
        &self,
        observation: &EventObservation<'_>,
    ) -> Result<Option<ViewEvent>, StoreError> {
        if !self.breaker.permits_write() {
            return Ok(None);
        }

        match self.store.upsert_event(observation, self.clock.wall_time()) {
            Ok(event) => {
                self.breaker.record_success();
                Ok(Some(event))
            }
            Err(e) => {
                self.breaker.record_failure();
                Err(e)
            }
        }
    }

    /// Record an observation unless its suppression window is still open.
    ///
    /// A cache failure on the suppression flag counts as "flag absent" and
    /// the write goes ahead. Storage failures are returned for the caller
    /// to log.
    pub fn record_if_due(
        &self,
        observation: &EventObservation<'_>,
        window: Duration,
    ) -> Result<RecordOutcome, StoreError> {
        let due = self
            .should_record_event(observation.scope, observation.viewer_id, observation.blocked, window)
            .unwrap_or_else(|e| {
                self.metrics.record_backend_error();
                warn!(error = %e, scope = %observation.scope, "Event suppression check failed, recording anyway");
                true
            });

        if !due {
            self.metrics.record_event_suppressed();
            return Ok(RecordOutcome::Suppressed);
        }

        match self.record_event(observation)? {
            Some(event) => {
                self.metrics.record_event_recorded();
                Ok(RecordOutcome::Recorded(event))
            }
            None => {
                debug!(scope = %observation.scope, "Event store circuit open, skipping write");
                self.metrics.record_event_suppressed();
                Ok(RecordOutcome::Skipped)
            }
        }
    }

    fn suppression_key(&self, scope: &str, viewer_id: &str, blocked: bool) -> String {
        let key = self.keys.event_suppression(scope, viewer_id);
        match self.suppression {
            EventSuppression::PerViewer => key,
            EventSuppression::PerOutcome if blocked => format!("{}:block", key),
            EventSuppression::PerOutcome => format!("{}:show", key),
        }
    }
}
