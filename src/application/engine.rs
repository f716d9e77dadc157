//! Decision orchestration.
//!
//! `AdsThrottle` answers "should this request see ads?" by walking a fixed
//! sequence, stopping at the first step that applies:
//!
//! 1. No request: show.
//! 2. Fingerprint the viewer and resolve the scope.
//! 3. Override: a forced block records an event and hides ads; a forced show
//!    shows ads without recording anything.
//! 4. Throttle: an existing block flag hides ads; otherwise the view is
//!    counted, and crossing the threshold sets the block flag and hides ads.
//!    Every outcome of this step is offered to the event recorder.
//!
//! Settings are resolved after the override lookup, only on the paths that
//! need them, so a forced show never reads settings.
//!
//! No backend failure ever reaches the caller. Each one is logged, counted
//! in `Metrics::backend_errors`, and treated as the answer that shows ads.

use crate::application::memo::RequestDecisions;
use crate::application::metrics::Metrics;
use crate::application::override_resolver::OverrideResolver;
use crate::application::recorder::EventRecorder;
use crate::application::settings_resolver::SettingsResolver;
use crate::application::throttle::ViewThrottle;
use crate::domain::decision::{AdsDecision, DecisionReason};
use crate::domain::event::EventObservation;
use crate::domain::fingerprint::{Fingerprint, FingerprintRules};
use crate::domain::override_rule::OverrideDecision;
use crate::domain::request::RequestContext;
use crate::domain::settings::ThrottleSettings;
use tracing::{debug, warn};

/// The ad throttling engine.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
#[derive(Debug, Clone)]
pub struct AdsThrottle {
    settings: SettingsResolver,
    overrides: OverrideResolver,
    throttle: ViewThrottle,
    recorder: EventRecorder,
    rules: FingerprintRules,
    metrics: Metrics,
}

impl AdsThrottle {
    /// Assemble an engine from its parts.
    ///
    /// Most callers want `AdsThrottle::builder()` instead.
    pub fn new(
        settings: SettingsResolver,
        overrides: OverrideResolver,
        throttle: ViewThrottle,
        recorder: EventRecorder,
        rules: FingerprintRules,
        metrics: Metrics,
    ) -> Self {
        Self {
            settings,
            overrides,
            throttle,
            recorder,
            rules,
            metrics,
        }
    }

    /// Decide for a request, scoped to its path.
    pub fn should_show_ads(&self, request: Option<&RequestContext>) -> bool {
        self.decide(request, None).show
    }

    /// Decide for a request in an explicit scope.
    pub fn should_show_ads_in_scope(&self, request: Option<&RequestContext>, scope: &str) -> bool {
        self.decide(request, Some(scope)).show
    }

    /// Decide at most once per scope for the lifetime of `decisions`.
    ///
    /// `scope` defaults to the request path. Repeat calls for a scope
    /// already in `decisions` return the stored answer without counting
    /// another view.
    pub fn show_ads(
        &self,
        request: &RequestContext,
        decisions: &mut RequestDecisions,
        scope: Option<&str>,
    ) -> bool {
        let scope = scope.unwrap_or_else(|| request.path());
        decisions.get_or_decide(scope, || self.decide(Some(request), Some(scope)).show)
    }

    /// Decide and report why.
    pub fn decide(&self, request: Option<&RequestContext>, scope: Option<&str>) -> AdsDecision {
        let Some(request) = request else {
            debug!("No request context, showing ads");
            let decision = AdsDecision::from(DecisionReason::NoRequest);
            self.metrics.record_decision(decision.show);
            return decision;
        };

        let scope = scope.unwrap_or_else(|| request.path());
        let fingerprint = Fingerprint::from_request(request, &self.rules);
        let reason = self.evaluate(request, &fingerprint, scope);
        let decision = AdsDecision::from(reason);

        self.metrics.record_decision(decision.show);
        debug!(
            scope = %scope,
            viewer = %fingerprint,
            reason = %reason,
            show = decision.show,
            "Ad decision"
        );
        decision
    }

    /// Drop the cached settings so the next decision re-reads storage.
    pub fn invalidate_settings(&self) {
        self.settings.invalidate();
    }

    /// Settings currently in force.
    pub fn settings(&self) -> ThrottleSettings {
        self.settings.get_settings()
    }

    pub fn fingerprint_rules(&self) -> &FingerprintRules {
        &self.rules
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    fn evaluate(
        &self,
        request: &RequestContext,
        fingerprint: &Fingerprint,
        scope: &str,
    ) -> DecisionReason {
        let viewer_id = fingerprint.viewer_id();

        match self.overrides.resolve_override(
            request.user_id(),
            viewer_id,
            fingerprint.ip_hash(),
            scope,
        ) {
            Some(OverrideDecision::Block) => {
                self.metrics.record_override_hit();
                let settings = self.settings.get_settings();
                self.record(scope, fingerprint, true, &settings);
                return DecisionReason::OverrideBlock;
            }
            Some(OverrideDecision::Show) => {
                self.metrics.record_override_hit();
                return DecisionReason::OverrideShow;
            }
            None => {}
        }

        let settings = self.settings.get_settings();

        let already_blocked = self
            .throttle
            .is_blocked(scope, viewer_id)
            .unwrap_or_else(|e| {
                self.metrics.record_backend_error();
                warn!(error = %e, scope = %scope, "Block flag read failed, treating as not blocked");
                false
            });
        if already_blocked {
            self.record(scope, fingerprint, true, &settings);
            return DecisionReason::AlreadyBlocked;
        }

        let over_threshold = self
            .throttle
            .check_and_increment(scope, viewer_id, settings.window(), settings.threshold())
            .unwrap_or_else(|e| {
                self.metrics.record_backend_error();
                warn!(error = %e, scope = %scope, "View counter update failed, treating as within threshold");
                false
            });
        if over_threshold {
            if let Err(e) = self
                .throttle
                .block(scope, viewer_id, settings.block_duration())
            {
                self.metrics.record_backend_error();
                warn!(error = %e, scope = %scope, "Failed to set block flag");
            }
            self.record(scope, fingerprint, true, &settings);
            return DecisionReason::ThresholdExceeded;
        }

        self.record(scope, fingerprint, false, &settings);
        DecisionReason::WithinThreshold
    }

    fn record(
        &self,
        scope: &str,
        fingerprint: &Fingerprint,
        blocked: bool,
        settings: &ThrottleSettings,
    ) {
        let observation = EventObservation {
            scope,
            viewer_id: fingerprint.viewer_id(),
            ip_hash: fingerprint.ip_hash(),
            blocked,
        };
        if let Err(e) = self
            .recorder
            .record_if_due(&observation, settings.event_record_window())
        {
            self.metrics.record_backend_error();
            warn!(error = %e, scope = %scope, "Failed to record view event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::override_rule::OverrideTarget;
    use crate::infrastructure::memory_cache::MemoryCache;
    use crate::infrastructure::memory_store::MemoryStore;
    use crate::infrastructure::mocks::MockClock;
    use std::sync::Arc;
    use std::time::Duration;

    fn engine(threshold: u64) -> (AdsThrottle, Arc<MemoryStore>, MockClock) {
        let clock = MockClock::default();
        let store = Arc::new(MemoryStore::with_clock(Arc::new(clock.clone())));
        store.put_settings(Some(ThrottleSettings::new(60, threshold, 60, 60).unwrap()));
        let engine = AdsThrottle::builder()
            .with_clock(Arc::new(clock.clone()))
            .with_cache(Arc::new(MemoryCache::new(Arc::new(clock.clone()))))
            .with_store(store.clone())
            .build()
            .unwrap();
        (engine, store, clock)
    }

    fn request() -> RequestContext {
        RequestContext::new("/article/").with_session_key("abc")
    }

    #[test]
    fn test_no_request_shows_ads() {
        let (engine, store, _) = engine(1);
        let decision = engine.decide(None, Some("/x/"));
        assert_eq!(decision, AdsDecision::from(DecisionReason::NoRequest));
        assert_eq!(store.event_count(), 0);
    }

    #[test]
    fn test_reasons_follow_view_count() {
        let (engine, _, _) = engine(1);
        let req = request();
        assert_eq!(
            engine.decide(Some(&req), None).reason,
            DecisionReason::WithinThreshold
        );
        assert_eq!(
            engine.decide(Some(&req), None).reason,
            DecisionReason::ThresholdExceeded
        );
        assert_eq!(
            engine.decide(Some(&req), None).reason,
            DecisionReason::AlreadyBlocked
        );
    }

    #[test]
    fn test_block_flag_expires() {
        let (engine, _, clock) = engine(1);
        let req = request();
        assert!(engine.should_show_ads(Some(&req)));
        assert!(!engine.should_show_ads(Some(&req)));

        clock.advance(Duration::from_secs(61));
        assert!(engine.should_show_ads(Some(&req)));
    }

    #[test]
    fn test_override_show_is_not_recorded() {
        let (engine, store, _) = engine(1);
        store
            .create_override(
                "/article/",
                OverrideTarget::ViewerId("session:abc".into()),
                OverrideDecision::Show,
                None,
            )
            .unwrap();

        for _ in 0..5 {
            assert_eq!(
                engine.decide(Some(&request()), None).reason,
                DecisionReason::OverrideShow
            );
        }
        assert_eq!(store.event("/article/", "session:abc"), None);
        assert_eq!(engine.metrics().override_hits(), 5);
    }

    #[test]
    fn test_override_block_is_recorded() {
        let (engine, store, _) = engine(10);
        store
            .create_override("", OverrideTarget::All, OverrideDecision::Block, None)
            .unwrap();

        assert!(!engine.should_show_ads(Some(&request())));
        let event = store.event("/article/", "session:abc").unwrap();
        assert!(event.blocked);
        assert_eq!(event.count, 1);
    }

    #[test]
    fn test_explicit_scope_is_independent_of_path() {
        let (engine, _, _) = engine(1);
        let req = request();
        assert!(engine.should_show_ads_in_scope(Some(&req), "sidebar"));
        assert!(!engine.should_show_ads_in_scope(Some(&req), "sidebar"));
        assert!(engine.should_show_ads(Some(&req)));
    }

    #[test]
    fn test_show_ads_memoises_per_scope() {
        let (engine, _, _) = engine(1);
        let req = request();
        let mut decisions = RequestDecisions::new();

        for _ in 0..4 {
            assert!(engine.show_ads(&req, &mut decisions, None));
        }
        assert_eq!(engine.metrics().decisions(), 1);
    }
}
