//! Window-based view-count throttle.
//!
//! Two independent cache entries per (scope, viewer):
//! - a view counter living for the view window, created on first view;
//! - a block flag living for the block duration, set once the counter
//!   passes the threshold.
//!
//! The flag outlives the counter when the block duration is longer than the
//! window, so a tripped viewer stays blocked after their views age out.
//!
//! Counting relies on the cache's atomic increment only. Concurrent callers
//! may both observe a count at the threshold and both increment past it;
//! that over-counts by at most one view per racing request.

use crate::application::ports::{Cache, CacheError};
use crate::domain::keys::CacheKeys;
use std::sync::Arc;
use std::time::Duration;

const BLOCK_FLAG: &[u8] = b"1";

/// View counter and block flag over the cache port.
#[derive(Debug, Clone)]
pub struct ViewThrottle {
    cache: Arc<dyn Cache>,
    keys: CacheKeys,
}

impl ViewThrottle {
    pub fn new(cache: Arc<dyn Cache>, keys: CacheKeys) -> Self {
        Self { cache, keys }
    }

    /// Whether the viewer is currently blocked in this scope.
    pub fn is_blocked(&self, scope: &str, viewer_id: &str) -> Result<bool, CacheError> {
        let key = self.keys.block_flag(scope, viewer_id);
        Ok(self.cache.get(&key)?.is_some())
    }

    /// Count a view and report whether the count now exceeds `threshold`.
    ///
    /// With `threshold = T`, views 1 through T return `false` and view T+1
    /// is the first to return `true`.
    pub fn check_and_increment(
        &self,
        scope: &str,
        viewer_id: &str,
        window: Duration,
        threshold: u64,
    ) -> Result<bool, CacheError> {
        let key = self.keys.view_count(scope, viewer_id);
        let count = self.cache.incr(&key, window)?;
        Ok(count > threshold)
    }

    /// Block the viewer in this scope for `duration`.
    pub fn block(&self, scope: &str, viewer_id: &str, duration: Duration) -> Result<(), CacheError> {
        let key = self.keys.block_flag(scope, viewer_id);
        self.cache.set(&key, BLOCK_FLAG, duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::memory_cache::MemoryCache;
    use crate::infrastructure::mocks::MockClock;

    const WINDOW: Duration = Duration::from_secs(60);

    fn throttle() -> (ViewThrottle, MockClock) {
        let clock = MockClock::default();
        let cache = Arc::new(MemoryCache::new(Arc::new(clock.clone())));
        (ViewThrottle::new(cache, CacheKeys::default()), clock)
    }

    #[test]
    fn test_threshold_boundary() {
        let (throttle, _) = throttle();
        for view in 1..=3 {
            assert!(
                !throttle.check_and_increment("/a/", "session:x", WINDOW, 3).unwrap(),
                "view {} should be within threshold",
                view
            );
        }
        assert!(throttle.check_and_increment("/a/", "session:x", WINDOW, 3).unwrap());
        assert!(throttle.check_and_increment("/a/", "session:x", WINDOW, 3).unwrap());
    }

    #[test]
    fn test_counter_resets_after_window() {
        let (throttle, clock) = throttle();
        assert!(!throttle.check_and_increment("/a/", "session:x", WINDOW, 1).unwrap());
        assert!(throttle.check_and_increment("/a/", "session:x", WINDOW, 1).unwrap());

        clock.advance(Duration::from_secs(61));
        assert!(!throttle.check_and_increment("/a/", "session:x", WINDOW, 1).unwrap());
    }

    #[test]
    fn test_increments_do_not_extend_window() {
        let (throttle, clock) = throttle();
        assert!(!throttle.check_and_increment("/a/", "session:x", WINDOW, 2).unwrap());
        clock.advance(Duration::from_secs(40));
        assert!(!throttle.check_and_increment("/a/", "session:x", WINDOW, 2).unwrap());
        clock.advance(Duration::from_secs(21));
        // Window opened 61s ago, so this is the first view of a new one
        assert!(!throttle.check_and_increment("/a/", "session:x", WINDOW, 2).unwrap());
    }

    #[test]
    fn test_pairs_are_independent() {
        let (throttle, _) = throttle();
        assert!(!throttle.check_and_increment("/a/", "session:x", WINDOW, 1).unwrap());
        assert!(!throttle.check_and_increment("/b/", "session:x", WINDOW, 1).unwrap());
        assert!(!throttle.check_and_increment("/a/", "session:y", WINDOW, 1).unwrap());
    }

    #[test]
    fn test_block_outlives_view_window() {
        let (throttle, clock) = throttle();
        throttle
            .block("/a/", "session:x", Duration::from_secs(300))
            .unwrap();
        assert!(throttle.is_blocked("/a/", "session:x").unwrap());
        assert!(!throttle.is_blocked("/b/", "session:x").unwrap());

        clock.advance(Duration::from_secs(120));
        assert!(throttle.is_blocked("/a/", "session:x").unwrap());

        clock.advance(Duration::from_secs(181));
        assert!(!throttle.is_blocked("/a/", "session:x").unwrap());
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let (throttle, _) = throttle();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let throttle = throttle.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        throttle
                            .check_and_increment("/a/", "session:x", WINDOW, u64::MAX)
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // 800 prior views, so the next one is the 801st
        assert!(throttle.check_and_increment("/a/", "session:x", WINDOW, 800).unwrap());
    }
}
