//! Request context handed to the decision engine.
//!
//! The engine never sees a framework request object. Callers copy the few
//! pieces of identity the fingerprinting rules need into a `RequestContext`.

use std::collections::BTreeMap;

/// Identifier of an authenticated account.
pub type UserId = u64;

/// The identity-bearing parts of an incoming request.
///
/// Header names are stored lowercased so lookups are case-insensitive.
///
/// # Example
/// ```
/// use ads_throttle::RequestContext;
///
/// let request = RequestContext::new("/articles/")
///     .with_session_key("abc123")
///     .with_header("X-Forwarded-For", "1.1.1.1, 2.2.2.2")
///     .with_remote_addr("10.0.0.1");
///
/// assert_eq!(request.path(), "/articles/");
/// assert_eq!(request.header("x-forwarded-for"), Some("1.1.1.1, 2.2.2.2"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    path: String,
    user_id: Option<UserId>,
    session_key: Option<String>,
    cookies: BTreeMap<String, String>,
    headers: BTreeMap<String, String>,
    remote_addr: Option<String>,
}

impl RequestContext {
    /// Create a context for a request to `path`.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Attach the authenticated user.
    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Attach the server-side session key.
    pub fn with_session_key(mut self, key: impl Into<String>) -> Self {
        self.session_key = Some(key.into());
        self
    }

    /// Attach a cookie.
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    /// Attach a header. The name is lowercased.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Attach the peer address as reported by the transport.
    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn session_key(&self) -> Option<&str> {
        self.session_key.as_deref()
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Look up a header by name, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn remote_addr(&self) -> Option<&str> {
        self.remote_addr.as_deref()
    }
}
