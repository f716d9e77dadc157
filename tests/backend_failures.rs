use ads_throttle::infrastructure::mocks::{FailingCache, FailingStore, MockCaptureLayer, MockClock};
use ads_throttle::{
    AdsThrottle, BreakerConfig, Cache, CacheKeys, DecisionReason, MemoryCache, MemoryStore, OverrideDecision,
    OverrideTarget, RequestContext, ThrottleSettings,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;

fn request(session: &str) -> RequestContext {
    RequestContext::new("/article/").with_session_key(session)
}

#[test]
fn test_everything_down_still_shows_ads() {
    let store = Arc::new(FailingStore::new());
    let engine = AdsThrottle::builder()
        .with_cache(Arc::new(FailingCache::new()))
        .with_store(store.clone())
        .with_defaults(ThrottleSettings::new(60, 1, 60, 60).unwrap())
        .build()
        .unwrap();

    // The counter never increments, so the threshold is never crossed
    for _ in 0..5 {
        assert_eq!(
            engine.decide(Some(&request("a")), None).reason,
            DecisionReason::WithinThreshold
        );
    }
    assert!(engine.metrics().backend_errors() > 0);
    assert!(store.calls() > 0);
}

#[test]
fn test_failures_are_logged_as_warnings() {
    let capture = MockCaptureLayer::new();
    let subscriber = tracing_subscriber::registry().with(capture.clone());

    let engine = AdsThrottle::builder()
        .with_cache(Arc::new(FailingCache::new()))
        .with_store(Arc::new(FailingStore::new()))
        .build()
        .unwrap();

    tracing::subscriber::with_default(subscriber, || {
        assert!(engine.should_show_ads(Some(&request("a"))));
    });

    let warnings = capture.at_level(Level::WARN);
    assert!(!warnings.is_empty());
    assert!(warnings
        .iter()
        .all(|event| event.field("error").is_some()));
    assert!(capture.contains_message("Failed to load overrides"));
    assert!(capture.contains_message("Failed to load throttle settings"));
    assert!(capture.contains_message("Failed to record view event"));
    assert_eq!(
        engine.metrics().backend_errors(),
        warnings.len() as u64
    );
}

#[test]
fn test_cache_down_falls_back_to_storage() {
    let store = Arc::new(MemoryStore::new());
    store.put_settings(Some(ThrottleSettings::new(60, 1, 60, 60).unwrap()));
    store
        .create_override("", OverrideTarget::All, OverrideDecision::Block, None)
        .unwrap();

    let engine = AdsThrottle::builder()
        .with_cache(Arc::new(FailingCache::new()))
        .with_store(store.clone())
        .build()
        .unwrap();

    assert_eq!(
        engine.decide(Some(&request("a")), None).reason,
        DecisionReason::OverrideBlock
    );
    // Nothing can be cached, so every decision reads storage again
    engine.should_show_ads(Some(&request("a")));
    assert_eq!(store.reads(), 4);
}

#[test]
fn test_event_store_outage_opens_breaker() {
    let clock = MockClock::default();
    let store = Arc::new(MemoryStore::with_clock(Arc::new(clock.clone())));
    let events = Arc::new(FailingStore::new());

    let engine = AdsThrottle::builder()
        .with_clock(Arc::new(clock.clone()))
        .with_cache(Arc::new(MemoryCache::new(Arc::new(clock.clone()))))
        .with_settings_store(store.clone())
        .with_override_store(store)
        .with_event_store(events.clone())
        .with_breaker(BreakerConfig {
            failure_threshold: 3,
            recovery_timeout_secs: 30,
        })
        .build()
        .unwrap();

    // Distinct viewers so no write is suppressed by the record window
    for viewer in ["a", "b", "c", "d", "e"] {
        assert!(engine.should_show_ads(Some(&request(viewer))));
    }
    assert_eq!(events.calls(), 3);
    assert_eq!(engine.metrics().backend_errors(), 3);
    assert_eq!(engine.metrics().events_suppressed(), 2);

    // One probe after the recovery timeout
    clock.advance(Duration::from_secs(31));
    assert!(engine.should_show_ads(Some(&request("f"))));
    assert!(engine.should_show_ads(Some(&request("g"))));
    assert_eq!(events.calls(), 4);
}

#[test]
fn test_corrupt_cached_resolution_is_recomputed() {
    let clock = MockClock::default();
    let cache = Arc::new(MemoryCache::new(Arc::new(clock.clone())));
    let store = Arc::new(MemoryStore::with_clock(Arc::new(clock.clone())));
    store
        .create_override("/article/", OverrideTarget::All, OverrideDecision::Block, None)
        .unwrap();

    let engine = AdsThrottle::builder()
        .with_clock(Arc::new(clock))
        .with_cache(cache.clone())
        .with_store(store)
        .build()
        .unwrap();

    let keys = CacheKeys::default();
    let key = keys.override_decision("/article/", "session:a", None, "");
    cache.set(&key, b"garbage", Duration::from_secs(60)).unwrap();

    assert_eq!(
        engine.decide(Some(&request("a")), None).reason,
        DecisionReason::OverrideBlock
    );
    assert_eq!(
        cache.get(&key).unwrap(),
        Some(b"block".to_vec())
    );
}
