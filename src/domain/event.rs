//! Durable view-event aggregates.

use std::time::SystemTime;

/// Cumulative show/block history for one (scope, viewer) pair.
///
/// One row exists per pair. Rows are only ever modified by an upsert that
/// increments `count` and overwrites `blocked` and `ip_hash` with the
/// latest observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewEvent {
    pub scope: String,
    pub viewer_hash: String,
    pub ip_hash: String,
    pub count: u64,
    pub blocked: bool,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl ViewEvent {
    /// First observation for a pair.
    pub fn first(observation: &EventObservation<'_>, now: SystemTime) -> Self {
        Self {
            scope: observation.scope.to_string(),
            viewer_hash: observation.viewer_id.to_string(),
            ip_hash: observation.ip_hash.to_string(),
            count: 1,
            blocked: observation.blocked,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fold a later observation into this row.
    pub fn apply(&mut self, observation: &EventObservation<'_>, now: SystemTime) {
        self.count = self.count.saturating_add(1);
        self.blocked = observation.blocked;
        self.ip_hash = observation.ip_hash.to_string();
        self.updated_at = now;
    }
}

/// A single show/block outcome to be folded into a `ViewEvent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventObservation<'a> {
    pub scope: &'a str,
    pub viewer_id: &'a str,
    pub ip_hash: &'a str,
    pub blocked: bool,
}
