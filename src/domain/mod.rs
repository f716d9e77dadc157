//! Domain layer - pure rules with no backend dependencies.
//!
//! This layer contains the core concepts of ad throttling:
//! - Request context and viewer fingerprinting
//! - Decision outcomes and their reasons
//! - Throttling settings and their validation
//! - Administrator overrides and their precedence
//! - Durable view-event aggregates
//! - Cache key families
//!
//! All types in this layer are pure and easily testable.

pub mod decision;
pub mod event;
pub mod fingerprint;
pub mod keys;
pub mod override_rule;
pub mod request;
pub mod settings;
