//! Observability metrics for ad throttling.
//!
//! Provides counters about decisions, overrides, event recording and
//! swallowed backend failures for monitoring and debugging.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metrics tracking throttling statistics.
///
/// All metrics use atomic operations for thread-safe updates and reads.
/// Clones share the same counters.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    /// Decisions computed (memoised repeats are not counted)
    decisions: AtomicU64,
    /// Decisions that showed ads
    ads_shown: AtomicU64,
    /// Decisions that blocked ads
    ads_blocked: AtomicU64,
    /// Decisions settled by an administrator override
    override_hits: AtomicU64,
    /// Durable event writes performed
    events_recorded: AtomicU64,
    /// Event writes skipped by the suppression window or the breaker
    events_suppressed: AtomicU64,
    /// Cache or storage failures swallowed by the engine
    backend_errors: AtomicU64,
}

impl Metrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    pub(crate) fn record_decision(&self, shown: bool) {
        self.inner.decisions.fetch_add(1, Ordering::Relaxed);
        if shown {
            self.inner.ads_shown.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.ads_blocked.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_override_hit(&self) {
        self.inner.override_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_event_recorded(&self) {
        self.inner.events_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_event_suppressed(&self) {
        self.inner.events_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_backend_error(&self) {
        self.inner.backend_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the number of decisions computed.
    pub fn decisions(&self) -> u64 {
        self.inner.decisions.load(Ordering::Relaxed)
    }

    pub fn ads_shown(&self) -> u64 {
        self.inner.ads_shown.load(Ordering::Relaxed)
    }

    pub fn ads_blocked(&self) -> u64 {
        self.inner.ads_blocked.load(Ordering::Relaxed)
    }

    pub fn override_hits(&self) -> u64 {
        self.inner.override_hits.load(Ordering::Relaxed)
    }

    pub fn events_recorded(&self) -> u64 {
        self.inner.events_recorded.load(Ordering::Relaxed)
    }

    pub fn events_suppressed(&self) -> u64 {
        self.inner.events_suppressed.load(Ordering::Relaxed)
    }

    pub fn backend_errors(&self) -> u64 {
        self.inner.backend_errors.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            decisions: self.decisions(),
            ads_shown: self.ads_shown(),
            ads_blocked: self.ads_blocked(),
            override_hits: self.override_hits(),
            events_recorded: self.events_recorded(),
            events_suppressed: self.events_suppressed(),
            backend_errors: self.backend_errors(),
        }
    }

    /// Reset all metrics to zero.
    pub fn reset(&self) {
        let inner = &self.inner;
        for counter in [
            &inner.decisions,
            &inner.ads_shown,
            &inner.ads_blocked,
            &inner.override_hits,
            &inner.events_recorded,
            &inner.events_suppressed,
            &inner.backend_errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub decisions: u64,
    pub ads_shown: u64,
    pub ads_blocked: u64,
    pub override_hits: u64,
    pub events_recorded: u64,
    pub events_suppressed: u64,
    pub backend_errors: u64,
}

impl MetricsSnapshot {
    /// Fraction of decisions that blocked ads (0.0 to 1.0).
    ///
    /// Returns 0.0 if no decisions have been made.
    pub fn block_rate(&self) -> f64 {
        if self.decisions == 0 {
            0.0
        } else {
            self.ads_blocked as f64 / self.decisions as f64
        }
    }
}
