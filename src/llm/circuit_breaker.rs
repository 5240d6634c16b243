//! Circuit breaker guarding the paid generative provider

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    /// One trial call in flight after the cooldown; other callers are rejected
    HalfOpen,
}

#[derive(Debug, Clone)]
struct BreakerEntry {
    state: BreakerState,
    consecutive_failures: usize,
    opened_at: Option<Instant>,
    trial_started_at: Option<Instant>,
}

impl Default for BreakerEntry {
    fn default() -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            trial_started_at: None,
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: usize,
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Per-operation circuit breaker
pub struct CircuitBreaker {
    entries: Mutex<HashMap<&'static str, BreakerEntry>>,
    config: CircuitBreakerConfig,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            config,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<&'static str, BreakerEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether calls for `operation` are currently rejected.
    ///
    /// An open breaker whose cooldown has elapsed moves to half-open and lets
    /// exactly one caller through as the trial. A trial that never reports
    /// back is replaced after another cooldown.
    pub fn is_open(&self, operation: &'static str) -> bool {
        let mut entries = self.entries();
        let entry = entries.entry(operation).or_default();
        let reset_timeout = self.config.reset_timeout;
        let expired = |at: Option<Instant>| at.map_or(true, |t| t.elapsed() >= reset_timeout);

        match entry.state {
            BreakerState::Closed => false,
            BreakerState::Open if expired(entry.opened_at) => {
                entry.state = BreakerState::HalfOpen;
                entry.trial_started_at = Some(Instant::now());
                false
            }
            BreakerState::Open => true,
            BreakerState::HalfOpen if expired(entry.trial_started_at) => {
                entry.trial_started_at = Some(Instant::now());
                false
            }
            BreakerState::HalfOpen => true,
        }
    }

    pub fn mark_success(&self, operation: &'static str) {
        let mut entries = self.entries();
        entries.insert(operation, BreakerEntry::default());
    }

    pub fn mark_failure(&self, operation: &'static str) {
        let mut entries = self.entries();
        let entry = entries.entry(operation).or_default();

        entry.consecutive_failures += 1;

        // a failed half-open trial reopens immediately
        if entry.state == BreakerState::HalfOpen
            || entry.consecutive_failures >= self.config.failure_threshold
        {
            entry.state = BreakerState::Open;
            entry.opened_at = Some(Instant::now());
            entry.trial_started_at = None;
        }
    }

    pub fn state(&self, operation: &'static str) -> BreakerState {
        self.entries()
            .get(operation)
            .map(|e| e.state)
            .unwrap_or(BreakerState::Closed)
    }

    pub fn failure_count(&self, operation: &'static str) -> usize {
        self.entries()
            .get(operation)
            .map(|e| e.consecutive_failures)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: usize, reset: Duration) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            reset_timeout: reset,
        })
    }

    #[test]
    fn test_closed_by_default() {
        let breaker = CircuitBreaker::default();
        assert!(!breaker.is_open("generate"));
        assert_eq!(breaker.state("generate"), BreakerState::Closed);
    }

    #[test]
    fn test_opens_after_threshold() {
        let breaker = breaker(3, Duration::from_secs(30));

        breaker.mark_failure("generate");
        breaker.mark_failure("generate");
        assert!(!breaker.is_open("generate"));

        breaker.mark_failure("generate");
        assert!(breaker.is_open("generate"));
        assert_eq!(breaker.state("generate"), BreakerState::Open);
    }

    #[test]
    fn test_success_resets() {
        let breaker = breaker(3, Duration::from_secs(30));

        breaker.mark_failure("generate");
        breaker.mark_failure("generate");
        breaker.mark_success("generate");

        assert_eq!(breaker.state("generate"), BreakerState::Closed);
        assert_eq!(breaker.failure_count("generate"), 0);
    }

    #[test]
    fn test_half_open_after_cooldown_and_reopen_on_failure() {
        let breaker = breaker(2, Duration::from_millis(50));

        breaker.mark_failure("generate");
        breaker.mark_failure("generate");
        assert!(breaker.is_open("generate"));

        std::thread::sleep(Duration::from_millis(80));

        assert!(!breaker.is_open("generate"));
        assert_eq!(breaker.state("generate"), BreakerState::HalfOpen);

        breaker.mark_failure("generate");
        assert_eq!(breaker.state("generate"), BreakerState::Open);
        assert!(breaker.is_open("generate"));
    }

    #[test]
    fn test_half_open_admits_a_single_trial() {
        let breaker = breaker(1, Duration::from_millis(50));

        breaker.mark_failure("generate");
        std::thread::sleep(Duration::from_millis(80));

        assert!(!breaker.is_open("generate"));
        assert!(breaker.is_open("generate"));
        assert!(breaker.is_open("generate"));

        breaker.mark_success("generate");
        assert_eq!(breaker.state("generate"), BreakerState::Closed);
        assert!(!breaker.is_open("generate"));
        assert!(!breaker.is_open("generate"));
    }

    #[test]
    fn test_abandoned_trial_is_replaced() {
        let breaker = breaker(1, Duration::from_millis(50));

        breaker.mark_failure("generate");
        std::thread::sleep(Duration::from_millis(80));
        assert!(!breaker.is_open("generate"));
        assert!(breaker.is_open("generate"));

        std::thread::sleep(Duration::from_millis(80));
        assert!(!breaker.is_open("generate"));
        assert_eq!(breaker.state("generate"), BreakerState::HalfOpen);
    }

    #[test]
    fn test_operations_are_independent() {
        let breaker = breaker(1, Duration::from_secs(30));
        breaker.mark_failure("generate");
        assert!(breaker.is_open("generate"));
        assert!(!breaker.is_open("probe"));
    }
}
