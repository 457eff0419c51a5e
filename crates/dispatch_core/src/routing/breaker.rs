//! Circuit breaker guarding the routing provider.
//!
//! States: `Closed` (normal) → `Open` (after `threshold` consecutive failures, holds
//! for `reset_after`) → `HalfOpen` (admits exactly one probe) → `Closed` on success or
//! back to `Open` on failure. State is shared across tasks via a `Mutex<State>`; the
//! breaker itself performs no I/O.

use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Closed,
    Open,
    HalfOpen,
}

struct State {
    phase: Phase,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

pub struct CircuitBreaker {
    threshold: u32,
    reset_after: Duration,
    state: Mutex<State>,
}

/// What the caller may do right now, decided by `admit()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// This call is the single probe permitted in `HalfOpen`; its outcome decides
    /// whether the breaker closes or reopens.
    Probe,
    Denied,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, reset_after: Duration) -> Self {
        Self {
            threshold,
            reset_after,
            state: Mutex::new(State {
                phase: Phase::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    pub fn admit(&self) -> Admission {
        let mut state = self.state.lock().expect("breaker mutex poisoned");
        match state.phase {
            Phase::Closed => Admission::Allowed,
            Phase::Open => {
                let elapsed = state.opened_at.map_or(Duration::ZERO, |t| t.elapsed());
                if elapsed >= self.reset_after {
                    state.phase = Phase::HalfOpen;
                    Admission::Probe
                } else {
                    Admission::Denied
                }
            }
            Phase::HalfOpen => Admission::Denied,
        }
    }

    /// Returns `true` if this call transitioned the breaker into `Open` — the caller
    /// uses that to trigger the admin alert required by §4.C5.
    pub fn record_failure(&self) -> bool {
        let mut state = self.state.lock().expect("breaker mutex poisoned");
        state.consecutive_failures += 1;
        let was_open = state.phase == Phase::Open;
        if state.phase == Phase::HalfOpen || state.consecutive_failures >= self.threshold {
            state.phase = Phase::Open;
            state.opened_at = Some(Instant::now());
        }
        state.phase == Phase::Open && !was_open
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock().expect("breaker mutex poisoned");
        state.phase = Phase::Closed;
        state.consecutive_failures = 0;
        state.opened_at = None;
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state.lock().expect("breaker mutex poisoned").phase, Phase::Open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        assert_eq!(breaker.admit(), Admission::Allowed);
        breaker.record_failure();
        breaker.record_failure();
        let opened = breaker.record_failure();
        assert!(opened, "third failure should trip the breaker");
        assert_eq!(breaker.admit(), Admission::Denied);
    }

    #[test]
    fn half_open_admits_exactly_one_probe() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(0));
        breaker.record_failure();
        assert_eq!(breaker.admit(), Admission::Probe);
        assert_eq!(breaker.admit(), Admission::Denied);
    }

    #[test]
    fn success_in_half_open_closes_the_breaker() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(0));
        breaker.record_failure();
        assert_eq!(breaker.admit(), Admission::Probe);
        breaker.record_success();
        assert_eq!(breaker.admit(), Admission::Allowed);
    }

    #[test]
    fn failed_probe_reopens_the_breaker() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(0));
        breaker.record_failure();
        assert_eq!(breaker.admit(), Admission::Probe);
        breaker.record_failure();
        assert!(breaker.is_open());
    }
}
