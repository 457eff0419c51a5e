//! Integration coverage for the routing circuit breaker scenario from §8: a
//! provider failing five times in a row trips the breaker, the sixth call is denied
//! without attempting a request, and a successful probe after the cooldown closes it
//! again.

use std::time::Duration;

use dispatch_core::routing::breaker::Admission;
use dispatch_core::routing::CircuitBreaker;

#[test]
fn sixth_call_is_denied_after_five_consecutive_failures_then_probe_recovers() {
    let breaker = CircuitBreaker::new(5, Duration::from_millis(0));

    for attempt in 1..=5 {
        assert_eq!(breaker.admit(), Admission::Allowed, "attempt {attempt} should be admitted");
        let opened = breaker.record_failure();
        assert_eq!(opened, attempt == 5, "the breaker must open on exactly the 5th failure");
    }

    // Zero reset duration means the very next admit() is already past the cooldown
    // and becomes the probe; a positive reset duration would instead deny here.
    match breaker.admit() {
        Admission::Probe => {
            breaker.record_success();
        }
        other => panic!("expected a probe admission once the cooldown elapses, got {other:?}"),
    }

    assert_eq!(breaker.admit(), Admission::Allowed, "a successful probe must close the breaker");
}

#[test]
fn breaker_stays_open_through_the_cooldown_window() {
    let breaker = CircuitBreaker::new(5, Duration::from_secs(60));
    for _ in 0..5 {
        breaker.record_failure();
    }
    assert!(breaker.is_open());
    assert_eq!(breaker.admit(), Admission::Denied, "cooldown has not elapsed yet");
}
