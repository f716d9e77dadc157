//! Override resolution with positive and negative caching.
//!
//! Resolutions are cached per (scope, viewer, user, ip) under one of three
//! markers: `block`, `show`, or `none`. The `none` marker records that the
//! store was checked and nothing matched, so viewers without overrides cost
//! one cache read per decision instead of a storage scan.

use crate::application::metrics::Metrics;
use crate::application::ports::{Cache, Clock, OverrideStore};
use crate::domain::keys::CacheKeys;
use crate::domain::override_rule::{Override, OverrideDecision, OverrideQuery};
use crate::domain::request::UserId;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const BLOCK_MARKER: &[u8] = b"block";
const SHOW_MARKER: &[u8] = b"show";
const NONE_MARKER: &[u8] = b"none";

fn encode(resolution: Option<OverrideDecision>) -> &'static [u8] {
    match resolution {
        Some(OverrideDecision::Block) => BLOCK_MARKER,
        Some(OverrideDecision::Show) => SHOW_MARKER,
        None => NONE_MARKER,
    }
}

/// Decode a cached marker. The outer `None` means the entry is unreadable.
fn decode(bytes: &[u8]) -> Option<Option<OverrideDecision>> {
    match bytes {
        BLOCK_MARKER => Some(Some(OverrideDecision::Block)),
        SHOW_MARKER => Some(Some(OverrideDecision::Show)),
        NONE_MARKER => Some(None),
        _ => None,
    }
}

/// Resolves administrator overrides for a viewer.
#[derive(Debug, Clone)]
pub struct OverrideResolver {
    cache: Arc<dyn Cache>,
    store: Arc<dyn OverrideStore>,
    clock: Arc<dyn Clock>,
    keys: CacheKeys,
    ttl: Duration,
    metrics: Metrics,
}

impl OverrideResolver {
    pub fn new(
        cache: Arc<dyn Cache>,
        store: Arc<dyn OverrideStore>,
        clock: Arc<dyn Clock>,
        keys: CacheKeys,
        ttl: Duration,
        metrics: Metrics,
    ) -> Self {
        Self {
            cache,
            store,
            clock,
            keys,
            ttl,
            metrics,
        }
    }

    /// Resolve the override decision for a viewer in a scope.
    ///
    /// Matching overrides are the active ones whose scope is `scope` or
    /// empty and whose target is everyone, the user, the viewer id or the
    /// IP hash. Any `Block` among them wins; otherwise any `Show`;
    /// otherwise `None`.
    ///
    /// Storage failures resolve to `None` and are not cached.
    pub fn resolve_override(
        &self,
        user: Option<UserId>,
        viewer_id: &str,
        ip_hash: &str,
        scope: &str,
    ) -> Option<OverrideDecision> {
        let key = self.keys.override_decision(scope, viewer_id, user, ip_hash);

        match self.cache.get(&key) {
            Ok(Some(bytes)) => match decode(&bytes) {
                Some(resolution) => return resolution,
                None => warn!(key = %key, "Ignoring unreadable cached override resolution"),
            },
            Ok(None) => {}
            Err(e) => {
                self.metrics.record_backend_error();
                warn!(error = %e, key = %key, "Override cache read failed, treating as miss");
            }
        }

        let query = OverrideQuery {
            scope,
            user,
            viewer_id,
            ip_hash,
            now: self.clock.wall_time(),
        };
        let candidates = match self.store.candidate_overrides(&query) {
            Ok(candidates) => candidates,
            Err(e) => {
                self.metrics.record_backend_error();
                warn!(error = %e, scope = %scope, "Failed to load overrides, ignoring them");
                return None;
            }
        };

        let resolution = OverrideDecision::resolve(
            candidates
                .iter()
                .filter(|rule| query.matches(rule))
                .map(Override::decision),
        );

        if let Err(e) = self.cache.set(&key, encode(resolution), self.ttl) {
            self.metrics.record_backend_error();
            warn!(error = %e, key = %key, "Failed to cache override resolution");
        }

        resolution
    }
}
