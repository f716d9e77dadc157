//! Viewer fingerprinting.
//!
//! A fingerprint pairs a stable viewer identity with a one-way hash of the
//! client IP. Raw IP addresses never leave this module: everything
//! downstream (cache keys, overrides, persisted events) sees only the hash.

use crate::domain::request::RequestContext;
use sha2::{Digest, Sha256};
use std::fmt;

/// De-facto proxy header carrying the client address chain.
pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Single-address header set by some reverse proxies.
pub const REAL_IP: &str = "x-real-ip";

/// Cookie name used by session frameworks when none is configured.
pub const DEFAULT_SESSION_COOKIE: &str = "sessionid";

/// Viewer identity used when nothing else identifies the visitor.
pub const ANONYMOUS_VIEWER: &str = "anonymous";

/// Rules controlling how requests are fingerprinted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintRules {
    ip_header: Option<String>,
    session_cookie_name: String,
}

impl FingerprintRules {
    /// Create rules with an optional custom client-IP header.
    ///
    /// The header name is normalised, so `X_REAL_IP`, `HTTP_X_REAL_IP`
    /// and `X-Real-Ip` all refer to the same header.
    pub fn new(ip_header: Option<&str>, session_cookie_name: impl Into<String>) -> Self {
        Self {
            ip_header: ip_header
                .map(normalize_header_name)
                .filter(|name| !name.is_empty()),
            session_cookie_name: session_cookie_name.into(),
        }
    }

    pub fn ip_header(&self) -> Option<&str> {
        self.ip_header.as_deref()
    }

    pub fn session_cookie_name(&self) -> &str {
        &self.session_cookie_name
    }
}

impl Default for FingerprintRules {
    fn default() -> Self {
        Self::new(None, DEFAULT_SESSION_COOKIE)
    }
}

/// Identity of a viewer for a single request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    viewer_id: String,
    ip_hash: String,
}

impl Fingerprint {
    /// Fingerprint a request.
    ///
    /// Viewers without an account, session or session cookie are keyed by
    /// their IP hash, or share the anonymous identity when no address is
    /// known either.
    pub fn from_request(request: &RequestContext, rules: &FingerprintRules) -> Self {
        let ip_hash = hash_ip(&resolve_client_ip(request, rules.ip_header()));
        let viewer_id = resolve_viewer_id(request, rules.session_cookie_name())
            .unwrap_or_else(|| {
                if ip_hash.is_empty() {
                    ANONYMOUS_VIEWER.to_string()
                } else {
                    format!("ip:{}", ip_hash)
                }
            });

        Self { viewer_id, ip_hash }
    }

    pub fn viewer_id(&self) -> &str {
        &self.viewer_id
    }

    /// Hashed client IP, empty when no address was found.
    pub fn ip_hash(&self) -> &str {
        &self.ip_hash
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.viewer_id)
    }
}

/// Resolve the viewer identity: account, then session, then session cookie.
pub fn resolve_viewer_id(request: &RequestContext, session_cookie_name: &str) -> Option<String> {
    if let Some(user_id) = request.user_id() {
        return Some(format!("user:{}", user_id));
    }

    request
        .session_key()
        .filter(|key| !key.is_empty())
        .or_else(|| {
            request
                .cookie(session_cookie_name)
                .filter(|value| !value.is_empty())
        })
        .map(|key| format!("session:{}", key))
}

/// Resolve the client IP address.
///
/// Order: configured custom header, first `X-Forwarded-For` entry,
/// `X-Real-IP`, then the transport's remote address. Returns an empty string
/// when nothing is present.
pub fn resolve_client_ip(request: &RequestContext, custom_header: Option<&str>) -> String {
    let from_custom = custom_header
        .and_then(|name| request.header(name))
        .and_then(first_entry);
    let from_forwarded = || request.header(FORWARDED_FOR).and_then(first_entry);
    let from_real_ip = || request.header(REAL_IP).and_then(non_blank);
    let from_peer = || request.remote_addr().and_then(non_blank);

    from_custom
        .or_else(from_forwarded)
        .or_else(from_real_ip)
        .or_else(from_peer)
        .map(str::to_string)
        .unwrap_or_default()
}

/// One-way hash of an IP address.
///
/// Empty input yields empty output; anything else is the lowercase hex
/// SHA-256 digest of its UTF-8 bytes.
///
/// # Example
/// ```
/// use ads_throttle::hash_ip;
///
/// assert_eq!(hash_ip(""), "");
/// assert_eq!(
///     hash_ip("127.0.0.1"),
///     "12ca17b49af2289436f303e0166030a21e525d266e209267433801a8fd4071a0"
/// );
/// ```
pub fn hash_ip(ip: &str) -> String {
    if ip.is_empty() {
        return String::new();
    }
    sha256_hex(ip)
}

/// Lowercase hex SHA-256 digest of a string.
pub(crate) fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Normalise a configured header name to its lowercase wire form.
///
/// Accepts CGI-style names (`HTTP_X_REAL_IP`, `X_REAL_IP`) as well as wire
/// names (`X-Real-IP`).
pub fn normalize_header_name(name: &str) -> String {
    let trimmed = name.trim();
    let upper = trimmed.to_ascii_uppercase();
    let without_prefix = if upper.starts_with("HTTP_") {
        &trimmed[5..]
    } else {
        trimmed
    };
    without_prefix.replace('_', "-").to_ascii_lowercase()
}

fn first_entry(value: &str) -> Option<&str> {
    value.split(',').next().and_then(non_blank)
}

fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
