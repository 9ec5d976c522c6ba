//! Circuit breaker guarding outbound publishes

use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU8, Ordering};
use std::time::Duration;

use serde::Serialize;

use super::current_time_ms;
use crate::infrastructure::metrics::REDIS_CIRCUIT_BREAKER_STATE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl CircuitState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Successful trial calls needed in half-open before closing
    pub success_threshold: u32,
    /// Time spent open before a trial call is allowed
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: Duration::from_secs(30),
        }
    }
}

/// Lock-free breaker. While open, callers skip the broker entirely instead of
/// waiting on a connection that is known to be down.
pub struct CircuitBreaker {
    state: AtomicU8,
    failures: AtomicU32,
    successes: AtomicU32,
    opened_at_ms: AtomicI64,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            state: AtomicU8::new(CircuitState::Closed as u8),
            failures: AtomicU32::new(0),
            successes: AtomicU32::new(0),
            opened_at_ms: AtomicI64::new(0),
            config,
        }
    }

    pub fn state(&self) -> CircuitState {
        let state = CircuitState::from_raw(self.state.load(Ordering::Acquire));
        if state != CircuitState::Open {
            return state;
        }

        let elapsed = current_time_ms() - self.opened_at_ms.load(Ordering::Acquire);
        if elapsed < self.config.open_timeout.as_millis() as i64 {
            return CircuitState::Open;
        }

        // Only one caller wins the Open -> HalfOpen swap
        if self
            .state
            .compare_exchange(
                CircuitState::Open as u8,
                CircuitState::HalfOpen as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            self.successes.store(0, Ordering::Release);
            REDIS_CIRCUIT_BREAKER_STATE.set(CircuitState::HalfOpen as i64);
            tracing::info!("Circuit breaker half-open, probing broker");
        }
        CircuitState::from_raw(self.state.load(Ordering::Acquire))
    }

    pub fn allow_request(&self) -> bool {
        self.state() != CircuitState::Open
    }

    pub fn record_success(&self) {
        match CircuitState::from_raw(self.state.load(Ordering::Acquire)) {
            CircuitState::Closed => self.failures.store(0, Ordering::Release),
            CircuitState::HalfOpen => {
                let successes = self.successes.fetch_add(1, Ordering::AcqRel) + 1;
                if successes >= self.config.success_threshold {
                    self.set_state(CircuitState::Closed);
                    tracing::info!("Circuit breaker closed");
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        match CircuitState::from_raw(self.state.load(Ordering::Acquire)) {
            CircuitState::Closed => {
                let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= self.config.failure_threshold {
                    self.set_state(CircuitState::Open);
                    tracing::warn!(failures, "Circuit breaker opened");
                }
            }
            CircuitState::HalfOpen => {
                self.set_state(CircuitState::Open);
                tracing::warn!("Circuit breaker trial call failed, reopening");
            }
            CircuitState::Open => {
                self.opened_at_ms.store(current_time_ms(), Ordering::Release);
            }
        }
    }

    fn set_state(&self, state: CircuitState) {
        self.state.store(state as u8, Ordering::Release);
        self.successes.store(0, Ordering::Release);
        match state {
            CircuitState::Open => self.opened_at_ms.store(current_time_ms(), Ordering::Release),
            CircuitState::Closed => self.failures.store(0, Ordering::Release),
            CircuitState::HalfOpen => {}
        }
        REDIS_CIRCUIT_BREAKER_STATE.set(state as i64);
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        CircuitBreakerStats {
            state: self.state(),
            consecutive_failures: self.failures.load(Ordering::Acquire),
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub consecutive_failures: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failures: u32, open_ms: u64) -> CircuitBreaker {
        CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold: failures,
            success_threshold: 2,
            open_timeout: Duration::from_millis(open_ms),
        })
    }

    #[test]
    fn test_opens_after_threshold() {
        let cb = breaker(3, 10_000);
        cb.record_failure();
        cb.record_failure();
        assert!(cb.allow_request());

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow_request());
    }

    #[test]
    fn test_success_clears_failure_streak() {
        let cb = breaker(3, 10_000);
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_trial_cycle() {
        let cb = breaker(1, 10);
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_failed_trial_reopens() {
        let cb = breaker(1, 10);
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_failure();
        assert_eq!(
            CircuitState::from_raw(cb.state.load(Ordering::Acquire)),
            CircuitState::Open
        );
    }
}
