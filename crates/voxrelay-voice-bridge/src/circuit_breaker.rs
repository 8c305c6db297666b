//! A minimal circuit breaker guarding STT/TTS provider calls: opens
//! after 3 consecutive failures, half-opens after a 30s cooldown. Kept as a
//! small internal struct rather than pulling in a dedicated crate — the
//! state machine is three states and two counters.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

const FAILURE_THRESHOLD: u32 = 3;
const COOLDOWN: Duration = Duration::from_secs(30);

pub struct CircuitBreaker {
    failure_count: AtomicU32,
    opened_at: Mutex<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self {
            failure_count: AtomicU32::new(0),
            opened_at: Mutex::new(None),
        }
    }

    /// Returns `true` if calls should currently be rejected without trying
    /// the provider (open). Transitions open -> half-open automatically
    /// once the cooldown elapses.
    pub fn is_open(&self) -> bool {
        let mut opened_at = self.opened_at.lock();
        match *opened_at {
            Some(at) if at.elapsed() < COOLDOWN => true,
            Some(_) => {
                *opened_at = None;
                false
            }
            None => false,
        }
    }

    pub fn record_success(&self) {
        self.failure_count.store(0, Ordering::Relaxed);
        *self.opened_at.lock() = None;
    }

    pub fn record_failure(&self) {
        let count = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        if count >= FAILURE_THRESHOLD {
            *self.opened_at.lock() = Some(Instant::now());
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_failures() {
        let cb = CircuitBreaker::new();
        assert!(!cb.is_open());
        cb.record_failure();
        cb.record_failure();
        assert!(!cb.is_open());
        cb.record_failure();
        assert!(cb.is_open());
    }

    #[test]
    fn success_resets_failure_count() {
        let cb = CircuitBreaker::new();
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        cb.record_failure();
        assert!(!cb.is_open());
    }
}
