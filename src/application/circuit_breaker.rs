//! Circuit breaker guarding durable event writes.
//!
//! Event recording must never slow down or fail a decision. When the event
//! store keeps failing, the breaker opens and writes are skipped outright
//! instead of paying a storage round-trip per request. After the recovery
//! timeout a single probe write is let through; its outcome closes or
//! re-opens the circuit.

use crate::application::ports::Clock;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Writes flow normally
    Closed = 0,
    /// Writes are skipped
    Open = 1,
    /// One probe write is allowed
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

/// Breaker tuning, deserialisable from the engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive write failures before the circuit opens
    pub failure_threshold: u32,
    /// Seconds to wait before probing the store again
    pub recovery_timeout_secs: u64,
}

impl BreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_secs: 30,
        }
    }
}

/// Fail-fast guard for the event store.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: AtomicU8,
    consecutive_failures: AtomicU64,
    /// Nanoseconds since `epoch` of the most recent failure
    last_failure_nanos: AtomicU64,
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    epoch: Instant,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        let epoch = clock.now();
        Self {
            state: AtomicU8::new(CircuitState::Closed as u8),
            consecutive_failures: AtomicU64::new(0),
            last_failure_nanos: AtomicU64::new(0),
            config,
            clock,
            epoch,
        }
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Whether a write may be attempted now.
    ///
    /// An open circuit moves to half-open once the recovery timeout has
    /// elapsed; only the caller that wins that transition gets the probe.
    pub fn permits_write(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => false,
            CircuitState::Open => {
                let elapsed = self.clock.now().saturating_duration_since(self.last_failure());
                if elapsed < self.config.recovery_timeout() {
                    return false;
                }
                self.state
                    .compare_exchange(
                        CircuitState::Open as u8,
                        CircuitState::HalfOpen as u8,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
            }
        }
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
        self.state
            .store(CircuitState::Closed as u8, Ordering::Release);
    }

    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        let nanos = self
            .clock
            .now()
            .saturating_duration_since(self.epoch)
            .as_nanos()
            .try_into()
            .unwrap_or(u64::MAX);
        self.last_failure_nanos.store(nanos, Ordering::Release);

        let reopen = match self.state() {
            CircuitState::HalfOpen | CircuitState::Open => true,
            CircuitState::Closed => failures >= u64::from(self.config.failure_threshold),
        };
        if reopen {
            self.state
                .store(CircuitState::Open as u8, Ordering::Release);
        }
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    fn last_failure(&self) -> Instant {
        self.epoch + Duration::from_nanos(self.last_failure_nanos.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mocks::MockClock;

    fn breaker(threshold: u32, recovery_secs: u64) -> (CircuitBreaker, MockClock) {
        let clock = MockClock::default();
        let config = BreakerConfig {
            failure_threshold: threshold,
            recovery_timeout_secs: recovery_secs,
        };
        (CircuitBreaker::new(config, Arc::new(clock.clone())), clock)
    }

    #[test]
    fn test_initial_state() {
        let (cb, _) = breaker(3, 10);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.permits_write());
    }

    #[test]
    fn test_opens_at_threshold() {
        let (cb, _) = breaker(3, 10);
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.permits_write());

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.permits_write());
    }

    #[test]
    fn test_success_resets_failures() {
        let (cb, _) = breaker(2, 10);
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 1);
    }

    #[test]
    fn test_single_probe_after_recovery_timeout() {
        let (cb, clock) = breaker(1, 10);
        cb.record_failure();
        assert!(!cb.permits_write());

        clock.advance(Duration::from_secs(10));
        assert!(cb.permits_write());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        // Probe already handed out
        assert!(!cb.permits_write());
    }

    #[test]
    fn test_probe_success_closes() {
        let (cb, clock) = breaker(1, 10);
        cb.record_failure();
        clock.advance(Duration::from_secs(11));
        assert!(cb.permits_write());

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.permits_write());
    }

    #[test]
    fn test_probe_failure_reopens() {
        let (cb, clock) = breaker(1, 10);
        cb.record_failure();
        clock.advance(Duration::from_secs(11));
        assert!(cb.permits_write());

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.permits_write());

        clock.advance(Duration::from_secs(11));
        assert!(cb.permits_write());
    }
}
