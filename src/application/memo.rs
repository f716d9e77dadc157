//! Per-request memoisation of decisions.
//!
//! A page render may ask about the same scope several times. The first ask
//! runs the full decision (and counts a view); later asks in the same
//! request reuse that answer. A `RequestDecisions` lives exactly as long as
//! the request it belongs to and is passed explicitly down the render.

use ahash::AHashMap;

/// Scope-to-decision map owned by a single request.
#[derive(Debug, Clone, Default)]
pub struct RequestDecisions {
    decisions: AHashMap<String, bool>,
}

impl RequestDecisions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the stored decision for `scope`, or run `decide` once and
    /// store its answer.
    ///
    /// # Example
    /// ```
    /// use ads_throttle::RequestDecisions;
    ///
    /// let mut decisions = RequestDecisions::new();
    /// let mut calls = 0;
    /// for _ in 0..3 {
    ///     decisions.get_or_decide("/news/", || {
    ///         calls += 1;
    ///         true
    ///     });
    /// }
    /// assert_eq!(calls, 1);
    /// ```
    pub fn get_or_decide(&mut self, scope: &str, decide: impl FnOnce() -> bool) -> bool {
        if let Some(&shown) = self.decisions.get(scope) {
            return shown;
        }
        let shown = decide();
        self.decisions.insert(scope.to_string(), shown);
        shown
    }

    pub fn get(&self, scope: &str) -> Option<bool> {
        self.decisions.get(scope).copied()
    }

    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_scope_decides_once() {
        let mut decisions = RequestDecisions::new();
        assert!(!decisions.get_or_decide("/a/", || false));
        // A different answer from a later closure is never consulted
        assert!(!decisions.get_or_decide("/a/", || true));
        assert_eq!(decisions.get("/a/"), Some(false));
    }

    #[test]
    fn test_scopes_are_independent() {
        let mut decisions = RequestDecisions::new();
        let mut calls = Vec::new();
        for scope in ["/a/", "/b/", "/a/", "/b/", ""] {
            decisions.get_or_decide(scope, || {
                calls.push(scope);
                true
            });
        }
        assert_eq!(calls, vec!["/a/", "/b/", ""]);
        assert_eq!(decisions.len(), 3);
    }
}
