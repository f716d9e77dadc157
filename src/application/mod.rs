//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain rules against the cache and storage
//! backends:
//! - Settings and override resolution (cached)
//! - View-count throttling and block flags
//! - Rate-limited event recording behind a circuit breaker
//! - The decision orchestrator and per-request memoisation
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod circuit_breaker;
pub mod engine;
pub mod memo;
pub mod metrics;
pub mod override_resolver;
pub mod ports;
pub mod recorder;
pub mod settings_resolver;
pub mod throttle;
