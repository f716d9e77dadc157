//! Cache key families.
//!
//! Every key the engine writes is prefixed with a product namespace. Scopes
//! are request paths and may contain characters some cache backends reject,
//! so they enter keys only as SHA-256 digests.

use crate::domain::fingerprint::sha256_hex;
use crate::domain::request::UserId;

/// Builds the five key families used by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeys {
    namespace: String,
}

impl CacheKeys {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Key of the cached settings mapping.
    pub fn settings(&self) -> String {
        format!("{}:settings", self.namespace)
    }

    /// Key of a cached override resolution.
    ///
    /// The user id is its own segment so an account-based and a
    /// session-based viewer can never share an entry.
    pub fn override_decision(
        &self,
        scope: &str,
        viewer_id: &str,
        user: Option<UserId>,
        ip_hash: &str,
    ) -> String {
        let user = user.map(|id| id.to_string()).unwrap_or_default();
        format!(
            "{}:override:{}:{}:{}:{}",
            self.namespace,
            sha256_hex(scope),
            viewer_id,
            user,
            ip_hash
        )
    }

    /// Key of the view counter for a (scope, viewer) pair.
    pub fn view_count(&self, scope: &str, viewer_id: &str) -> String {
        self.pair_key("views", scope, viewer_id)
    }

    /// Key of the block flag for a (scope, viewer) pair.
    pub fn block_flag(&self, scope: &str, viewer_id: &str) -> String {
        self.pair_key("block", scope, viewer_id)
    }

    /// Key of the event-suppression flag for a (scope, viewer) pair.
    pub fn event_suppression(&self, scope: &str, viewer_id: &str) -> String {
        self.pair_key("event", scope, viewer_id)
    }

    fn pair_key(&self, family: &str, scope: &str, viewer_id: &str) -> String {
        format!(
            "{}:{}:{}:{}",
            self.namespace,
            family,
            sha256_hex(scope),
            viewer_id
        )
    }
}

impl Default for CacheKeys {
    fn default() -> Self {
        Self::new("ads_throttle")
    }
}
