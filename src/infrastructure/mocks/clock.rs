//! Mock clock for testing.

use crate::application::ports::Clock;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

/// Mock clock for testing.
///
/// Allows tests to control time progression explicitly, enabling deterministic
/// testing of cache expiry and override expiry. Monotonic and wall time
/// advance together.
///
/// # Examples
///
/// ```
/// use ads_throttle::infrastructure::mocks::MockClock;
/// use ads_throttle::application::ports::Clock;
/// use std::time::{Duration, Instant, SystemTime};
///
/// let start = Instant::now();
/// let wall = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
/// let clock = MockClock::starting_at(start, wall);
///
/// clock.advance(Duration::from_secs(10));
/// assert_eq!(clock.now(), start + Duration::from_secs(10));
/// assert_eq!(clock.wall_time(), wall + Duration::from_secs(10));
/// ```
///
/// # Thread Safety
///
/// `MockClock` can be cloned to share across threads. All clones share the
/// same underlying time, so advancing one advances all of them.
#[derive(Debug, Clone)]
pub struct MockClock {
    current: Arc<Mutex<(Instant, SystemTime)>>,
}

impl MockClock {
    /// Create a mock clock starting at `start`, with wall time at the
    /// current system time.
    pub fn new(start: Instant) -> Self {
        Self::starting_at(start, SystemTime::now())
    }

    /// Create a mock clock with explicit monotonic and wall starting points.
    pub fn starting_at(start: Instant, wall: SystemTime) -> Self {
        Self {
            current: Arc::new(Mutex::new((start, wall))),
        }
    }

    /// Advance both clocks by a duration.
    pub fn advance(&self, duration: Duration) {
        let mut current = self
            .current
            .lock()
            .expect("MockClock mutex poisoned - a test thread panicked while holding the lock");
        current.0 += duration;
        current.1 += duration;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new(Instant::now())
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.current
            .lock()
            .expect("MockClock mutex poisoned - a test thread panicked while holding the lock")
            .0
    }

    fn wall_time(&self) -> SystemTime {
        self.current
            .lock()
            .expect("MockClock mutex poisoned - a test thread panicked while holding the lock")
            .1
    }
}
