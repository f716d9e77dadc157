//! # ads-throttle
//!
//! Per-viewer ad throttling for page renders.
//!
//! Given a request and a scope (a page or placement, usually the request
//! path), the engine decides whether ads should be shown. Viewers who load
//! the same scope more than a configured number of times within a window
//! are blocked for a while; administrators can force ads on or off for a
//! user, a viewer, an IP address or everybody.
//!
//! ## Quick Start
//!
//! ```rust
//! use ads_throttle::{AdsThrottle, RequestContext, RequestDecisions, ThrottleSettings};
//!
//! let engine = AdsThrottle::builder()
//!     .with_defaults(ThrottleSettings::new(60, 2, 300, 60).unwrap())
//!     .build()
//!     .unwrap();
//!
//! let request = RequestContext::new("/articles/rust/")
//!     .with_session_key("k3y")
//!     .with_header("X-Forwarded-For", "203.0.113.7, 10.0.0.1");
//!
//! assert!(engine.should_show_ads(Some(&request)));
//! assert!(engine.should_show_ads(Some(&request)));
//! // Third view within the window crosses the threshold
//! assert!(!engine.should_show_ads(Some(&request)));
//!
//! // A template asking several times in one render counts one view
//! let sidebar = RequestContext::new("/sidebar/").with_session_key("k3y");
//! let mut decisions = RequestDecisions::new();
//! for _ in 0..5 {
//!     assert!(engine.show_ads(&sidebar, &mut decisions, None));
//! }
//! ```
//!
//! ## Decision Sequence
//!
//! 1. No request → show.
//! 2. Fingerprint: the viewer is `user:<id>`, else `session:<key>`, else
//!    `session:<cookie>`, else `ip:<ip hash>`, else `anonymous`. Client IPs
//!    are SHA-256 hashed immediately and never stored raw.
//! 3. Overrides: any matching block wins over any matching show. Forced
//!    shows are not recorded as view events.
//! 4. Throttle: an existing block flag blocks; otherwise the view is
//!    counted and the first view past the threshold sets the block flag.
//!
//! ## Backends
//!
//! Ephemeral state (view counters, block flags, cached settings and
//! override resolutions) lives behind the [`Cache`] port:
//! [`MemoryCache`] in-process, or `RedisCache` with the `redis-cache`
//! feature. Durable state (settings record, overrides, view events) lives
//! behind [`SettingsStore`], [`OverrideStore`] and [`EventStore`];
//! [`MemoryStore`] implements all three.
//!
//! ## Fail-Safe Operation
//!
//! Showing ads must never fail a page render. Every cache or storage error
//! is logged with `tracing::warn!`, counted in
//! [`Metrics::backend_errors`], and treated as a miss:
//!
//! - unreadable cache → resolve from storage;
//! - storage down → static default settings, no override;
//! - counter update failed → within threshold;
//! - event write failed → decision unaffected; repeated failures open a
//!   circuit breaker that skips writes until a recovery timeout passes.
//!
//! ## Observability
//!
//! ```rust
//! use ads_throttle::{AdsThrottle, RequestContext};
//!
//! let engine = AdsThrottle::builder().build().unwrap();
//! engine.should_show_ads(Some(&RequestContext::new("/")));
//!
//! let snapshot = engine.metrics().snapshot();
//! assert_eq!(snapshot.decisions, 1);
//! assert_eq!(snapshot.ads_shown, 1);
//! ```

// Domain layer - pure business logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    decision::{AdsDecision, DecisionReason},
    event::{EventObservation, ViewEvent},
    fingerprint::{hash_ip, resolve_client_ip, resolve_viewer_id, Fingerprint, FingerprintRules},
    keys::CacheKeys,
    override_rule::{
        Override, OverrideDecision, OverrideError, OverrideId, OverrideQuery, OverrideTarget,
    },
    request::{RequestContext, UserId},
    settings::{SettingsError, ThrottleSettings},
};

pub use application::{
    circuit_breaker::{BreakerConfig, CircuitBreaker, CircuitState},
    engine::AdsThrottle,
    memo::RequestDecisions,
    metrics::{Metrics, MetricsSnapshot},
    override_resolver::OverrideResolver,
    ports::{Cache, CacheError, Clock, EventStore, OverrideStore, SettingsStore, StoreError},
    recorder::{EventRecorder, EventSuppression, RecordOutcome},
    settings_resolver::SettingsResolver,
    throttle::ViewThrottle,
};

pub use infrastructure::{
    builder::{AdsThrottleBuilder, BuildError},
    clock::SystemClock,
    config::{ConfigError, EngineConfig},
    memory_cache::MemoryCache,
    memory_store::MemoryStore,
};

#[cfg(feature = "redis-cache")]
pub use infrastructure::redis_cache::RedisCache;
