//! Administrator overrides.
//!
//! An override forces ads to be shown or blocked for one target within a
//! scope, bypassing the view-count throttle. Overrides are created by an
//! administrative collaborator and are read-only to the engine.

use crate::domain::fingerprint::hash_ip;
use crate::domain::request::UserId;
use std::fmt;
use std::time::SystemTime;
use thiserror::Error;

/// Error returned when an override cannot be constructed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OverrideError {
    /// None of the target inputs was populated
    #[error("provide exactly one target: a user, a viewer id, an IP address, or all viewers")]
    NoTarget,
    /// More than one target input was populated
    #[error("only one target may be set, got {count}")]
    MultipleTargets {
        /// Number of populated inputs
        count: usize,
    },
    /// A string target was present but blank
    #[error("{field} must not be blank")]
    EmptyIdentifier {
        /// Name of the blank input
        field: &'static str,
    },
    /// Scope was neither empty nor an absolute path
    #[error("scope must be empty or start with '/', got {0:?}")]
    InvalidScope(String),
}

/// Outcome an override forces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverrideDecision {
    /// Never show ads to the target
    Block,
    /// Always show ads to the target
    Show,
}

impl OverrideDecision {
    /// Resolve a set of matching decisions. Block wins over show.
    ///
    /// # Example
    /// ```
    /// use ads_throttle::OverrideDecision;
    ///
    /// let decisions = [OverrideDecision::Show, OverrideDecision::Block, OverrideDecision::Show];
    /// assert_eq!(OverrideDecision::resolve(decisions), Some(OverrideDecision::Block));
    /// assert_eq!(OverrideDecision::resolve([]), None);
    /// ```
    pub fn resolve(decisions: impl IntoIterator<Item = OverrideDecision>) -> Option<Self> {
        let mut resolved = None;
        for decision in decisions {
            match decision {
                OverrideDecision::Block => return Some(OverrideDecision::Block),
                OverrideDecision::Show => resolved = Some(OverrideDecision::Show),
            }
        }
        resolved
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OverrideDecision::Block => "block",
            OverrideDecision::Show => "show",
        }
    }
}

impl fmt::Display for OverrideDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who an override applies to. Exactly one variant, by construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OverrideTarget {
    /// An authenticated account
    User(UserId),
    /// A viewer identity such as `session:<key>`
    ViewerId(String),
    /// A hashed client IP
    IpHash(String),
    /// Every viewer
    All,
}

impl OverrideTarget {
    /// Build a target from the loosely-typed inputs of an administrative form.
    ///
    /// Exactly one input must be populated.
    ///
    /// # Errors
    /// `NoTarget` when nothing is set, `MultipleTargets` when more than one
    /// is, `EmptyIdentifier` when a string input is blank.
    pub fn from_parts(
        user: Option<UserId>,
        viewer_id: Option<&str>,
        ip_hash: Option<&str>,
        all: bool,
    ) -> Result<Self, OverrideError> {
        let count = usize::from(user.is_some())
            + usize::from(viewer_id.is_some())
            + usize::from(ip_hash.is_some())
            + usize::from(all);
        if count == 0 {
            return Err(OverrideError::NoTarget);
        }
        if count > 1 {
            return Err(OverrideError::MultipleTargets { count });
        }

        if let Some(user) = user {
            return Ok(OverrideTarget::User(user));
        }
        if let Some(viewer_id) = viewer_id {
            return non_blank(viewer_id, "viewer_id")
                .map(|v| OverrideTarget::ViewerId(v.to_string()));
        }
        if let Some(ip_hash) = ip_hash {
            return non_blank(ip_hash, "ip_hash").map(|v| OverrideTarget::IpHash(v.to_string()));
        }
        Ok(OverrideTarget::All)
    }

    /// Target a raw IP address. Only its hash is kept.
    pub fn for_ip(raw_ip: &str) -> Result<Self, OverrideError> {
        let ip = non_blank(raw_ip, "raw_ip")?;
        Ok(OverrideTarget::IpHash(hash_ip(ip)))
    }

    /// Whether this target covers the given viewer.
    pub fn matches(&self, user: Option<UserId>, viewer_id: &str, ip_hash: &str) -> bool {
        match self {
            OverrideTarget::All => true,
            OverrideTarget::User(id) => user == Some(*id),
            OverrideTarget::ViewerId(v) => v == viewer_id,
            OverrideTarget::IpHash(h) => !ip_hash.is_empty() && h == ip_hash,
        }
    }
}

fn non_blank<'a>(value: &'a str, field: &'static str) -> Result<&'a str, OverrideError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(OverrideError::EmptyIdentifier { field })
    } else {
        Ok(trimmed)
    }
}

/// Identifier of a persisted override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OverrideId(pub u64);

impl fmt::Display for OverrideId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An administrator rule forcing ads shown or blocked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Override {
    id: OverrideId,
    scope: String,
    target: OverrideTarget,
    decision: OverrideDecision,
    expires_at: Option<SystemTime>,
    created_at: SystemTime,
}

impl Override {
    /// Create a validated override.
    ///
    /// # Errors
    /// `InvalidScope` unless `scope` is empty or starts with `/`.
    pub fn new(
        id: OverrideId,
        scope: impl Into<String>,
        target: OverrideTarget,
        decision: OverrideDecision,
        expires_at: Option<SystemTime>,
        created_at: SystemTime,
    ) -> Result<Self, OverrideError> {
        let scope = scope.into();
        validate_scope(&scope)?;
        Ok(Self {
            id,
            scope,
            target,
            decision,
            expires_at,
            created_at,
        })
    }

    pub fn id(&self) -> OverrideId {
        self.id
    }

    /// Scope this override applies to; empty means every scope.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn target(&self) -> &OverrideTarget {
        &self.target
    }

    pub fn decision(&self) -> OverrideDecision {
        self.decision
    }

    pub fn expires_at(&self) -> Option<SystemTime> {
        self.expires_at
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// An override is active until its expiry passes.
    pub fn is_active(&self, now: SystemTime) -> bool {
        self.expires_at.map_or(true, |expires| expires > now)
    }

    /// Whether this override applies to `scope`. Exact match only.
    pub fn covers_scope(&self, scope: &str) -> bool {
        self.scope.is_empty() || self.scope == scope
    }
}

/// Scope must be empty (everywhere) or an absolute path.
pub fn validate_scope(scope: &str) -> Result<(), OverrideError> {
    if scope.is_empty() || scope.starts_with('/') {
        Ok(())
    } else {
        Err(OverrideError::InvalidScope(scope.to_string()))
    }
}

/// The viewer and scope an override lookup is made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverrideQuery<'a> {
    pub scope: &'a str,
    pub user: Option<UserId>,
    pub viewer_id: &'a str,
    pub ip_hash: &'a str,
    pub now: SystemTime,
}

impl OverrideQuery<'_> {
    /// Whether an override is active and applies to this viewer and scope.
    pub fn matches(&self, rule: &Override) -> bool {
        rule.is_active(self.now)
            && rule.covers_scope(self.scope)
            && rule
                .target()
                .matches(self.user, self.viewer_id, self.ip_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn rule(scope: &str, target: OverrideTarget, expires_at: Option<SystemTime>) -> Override {
        Override::new(
            OverrideId(1),
            scope,
            target,
            OverrideDecision::Block,
            expires_at,
            SystemTime::UNIX_EPOCH,
        )
        .unwrap()
    }

    #[test]
    fn test_from_parts_requires_a_target() {
        assert_eq!(
            OverrideTarget::from_parts(None, None, None, false),
            Err(OverrideError::NoTarget)
        );
    }

    #[test]
    fn test_from_parts_rejects_multiple_targets() {
        assert_eq!(
            OverrideTarget::from_parts(Some(1), Some("session:abc"), None, false),
            Err(OverrideError::MultipleTargets { count: 2 })
        );
        assert_eq!(
            OverrideTarget::from_parts(Some(1), None, Some("abc"), true),
            Err(OverrideError::MultipleTargets { count: 3 })
        );
    }

    #[test]
    fn test_from_parts_single_targets() {
        assert_eq!(
            OverrideTarget::from_parts(Some(7), None, None, false),
            Ok(OverrideTarget::User(7))
        );
        assert_eq!(
            OverrideTarget::from_parts(None, Some(" session:abc "), None, false),
            Ok(OverrideTarget::ViewerId("session:abc".to_string()))
        );
        assert_eq!(
            OverrideTarget::from_parts(None, None, None, true),
            Ok(OverrideTarget::All)
        );
    }

    #[test]
    fn test_from_parts_rejects_blank_identifier() {
        assert_eq!(
            OverrideTarget::from_parts(None, Some("  "), None, false),
            Err(OverrideError::EmptyIdentifier { field: "viewer_id" })
        );
    }

    #[test]
    fn test_for_ip_hashes_raw_address() {
        assert_eq!(
            OverrideTarget::for_ip("1.2.3.4"),
            Ok(OverrideTarget::IpHash(hash_ip("1.2.3.4")))
        );
        assert_eq!(
            OverrideTarget::for_ip(""),
            Err(OverrideError::EmptyIdentifier { field: "raw_ip" })
        );
    }

    #[test]
    fn test_scope_must_start_with_slash_when_not_empty() {
        let err = Override::new(
            OverrideId(1),
            "bad",
            OverrideTarget::All,
            OverrideDecision::Block,
            None,
            SystemTime::UNIX_EPOCH,
        )
        .unwrap_err();
        assert_eq!(err, OverrideError::InvalidScope("bad".to_string()));
        assert!(validate_scope("").is_ok());
        assert!(validate_scope("/news/").is_ok());
    }

    #[test]
    fn test_is_active() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(10_000);
        assert!(rule("/", OverrideTarget::All, None).is_active(now));
        assert!(rule("/", OverrideTarget::All, Some(now + Duration::from_secs(3600))).is_active(now));
        assert!(!rule("/", OverrideTarget::All, Some(now - Duration::from_secs(3600))).is_active(now));
        assert!(!rule("/", OverrideTarget::All, Some(now)).is_active(now));
    }

    #[test]
    fn test_empty_scope_covers_everything() {
        let everywhere = rule("", OverrideTarget::All, None);
        assert!(everywhere.covers_scope("/news/"));
        assert!(everywhere.covers_scope(""));

        let news = rule("/news/", OverrideTarget::All, None);
        assert!(news.covers_scope("/news/"));
        assert!(!news.covers_scope("/news/world/"));
    }

    #[test]
    fn test_ip_target_never_matches_missing_ip() {
        let target = OverrideTarget::IpHash(hash_ip("1.2.3.4"));
        assert!(!target.matches(None, "session:abc", ""));
        assert!(target.matches(None, "session:abc", &hash_ip("1.2.3.4")));
    }

    #[test]
    fn test_query_matches() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(10_000);
        let query = OverrideQuery {
            scope: "/offers/",
            user: Some(5),
            viewer_id: "user:5",
            ip_hash: "",
            now,
        };
        assert!(query.matches(&rule("/offers/", OverrideTarget::User(5), None)));
        assert!(query.matches(&rule("", OverrideTarget::ViewerId("user:5".into()), None)));
        assert!(!query.matches(&rule("/other/", OverrideTarget::User(5), None)));
        assert!(!query.matches(&rule("/offers/", OverrideTarget::User(6), None)));
        assert!(!query.matches(&rule(
            "/offers/",
            OverrideTarget::User(5),
            Some(now - Duration::from_secs(1))
        )));
    }
}
