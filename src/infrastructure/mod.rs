//! Infrastructure layer - external adapters and integrations.
//!
//! This layer provides adapters for:
//! - Clock abstraction (system time vs mock)
//! - Cache backends (in-process, Redis)
//! - Storage backends (in-process)
//! - Configuration loading and engine assembly

pub mod builder;
pub mod clock;
pub mod config;
pub mod memory_cache;
pub mod memory_store;

#[cfg(feature = "redis-cache")]
pub mod redis_cache;

/// Mock implementations for testing.
///
/// This module is only available when the `test-helpers` feature is enabled,
/// or during test builds. It provides a controllable clock, failing
/// backends and a log-capturing layer.
///
/// To use these mocks in integration tests, add to your `Cargo.toml`:
/// ```toml
/// [dev-dependencies]
/// ads-throttle = { version = "*", features = ["test-helpers"] }
/// ```
#[cfg(any(test, feature = "test-helpers"))]
pub mod mocks;
