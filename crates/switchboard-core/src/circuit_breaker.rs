//! Circuit Breaker (spec.md §4.C) — per-backend failure isolation sitting
//! between the Execution Engine and the Backend Adapters.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerState {
    state: State,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

impl Default for BreakerState {
    fn default() -> Self {
        Self {
            state: State::Closed,
            consecutive_failures: 0,
            opened_at: None,
            probe_in_flight: false,
        }
    }
}

/// Outcome of asking the breaker for permission to call a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Proceed with the call normally.
    Allowed,
    /// Proceed, but this call is the single HALF_OPEN probe — its result
    /// must be reported via `record_probe_result` rather than
    /// `record_success`/`record_failure`.
    Probe,
    /// Fail immediately with `BACKEND_OPEN`.
    Rejected,
}

pub struct CircuitBreaker {
    failure_threshold: u32,
    open_duration: Duration,
    backends: Mutex<HashMap<String, BreakerState>>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, open_duration: Duration) -> Self {
        Self {
            failure_threshold,
            open_duration,
            backends: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(5, Duration::from_secs(30))
    }

    /// Ask whether a call to `backend_id` may proceed right now.
    pub fn admit(&self, backend_id: &str) -> Admission {
        let mut backends = self.backends.lock().expect("circuit breaker lock poisoned");
        let entry = backends.entry(backend_id.to_string()).or_default();

        match entry.state {
            State::Closed => Admission::Allowed,
            State::Open => {
                let elapsed = entry.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.open_duration {
                    entry.state = State::HalfOpen;
                    entry.probe_in_flight = true;
                    tracing::info!(backend_id, "circuit breaker transitioning to half-open, admitting probe");
                    Admission::Probe
                } else {
                    Admission::Rejected
                }
            }
            State::HalfOpen => {
                if entry.probe_in_flight {
                    Admission::Rejected
                } else {
                    entry.probe_in_flight = true;
                    Admission::Probe
                }
            }
        }
    }

    pub fn record_success(&self, backend_id: &str) {
        let mut backends = self.backends.lock().expect("circuit breaker lock poisoned");
        let entry = backends.entry(backend_id.to_string()).or_default();
        entry.consecutive_failures = 0;
        if entry.state != State::Closed {
            tracing::info!(backend_id, "circuit breaker closing after success");
        }
        entry.state = State::Closed;
        entry.opened_at = None;
        entry.probe_in_flight = false;
    }

    pub fn record_failure(&self, backend_id: &str) {
        let mut backends = self.backends.lock().expect("circuit breaker lock poisoned");
        let entry = backends.entry(backend_id.to_string()).or_default();
        entry.consecutive_failures += 1;
        entry.probe_in_flight = false;
        if entry.consecutive_failures >= self.failure_threshold {
            entry.state = State::Open;
            entry.opened_at = Some(Instant::now());
            tracing::warn!(backend_id, failures = entry.consecutive_failures, "circuit breaker opened");
        }
    }

    /// A snapshot of every known backend's current state, for health
    /// reporting (spec.md §4.L's `healthCheck`).
    pub fn snapshot(&self) -> HashMap<String, String> {
        let backends = self.backends.lock().expect("circuit breaker lock poisoned");
        backends
            .iter()
            .map(|(id, entry)| {
                let state = match entry.state {
                    State::Closed => "closed",
                    State::Open => "open",
                    State::HalfOpen => "half_open",
                };
                (id.clone(), state.to_string())
            })
            .collect()
    }

    /// Report the outcome of a call admitted as `Admission::Probe`.
    pub fn record_probe_result(&self, backend_id: &str, success: bool) {
        if success {
            self.record_success(backend_id);
        } else {
            let mut backends = self.backends.lock().expect("circuit breaker lock poisoned");
            let entry = backends.entry(backend_id.to_string()).or_default();
            entry.state = State::Open;
            entry.opened_at = Some(Instant::now());
            entry.probe_in_flight = false;
            tracing::warn!(backend_id, "circuit breaker probe failed, reopening");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_allows_until_threshold_then_opens() {
        let cb = CircuitBreaker::new(3, Duration::from_secs(30));
        for _ in 0..2 {
            assert_eq!(cb.admit("b1"), Admission::Allowed);
            cb.record_failure("b1");
        }
        assert_eq!(cb.admit("b1"), Admission::Allowed);
        cb.record_failure("b1");
        assert_eq!(cb.admit("b1"), Admission::Rejected);
    }

    #[test]
    fn success_resets_failure_counter() {
        let cb = CircuitBreaker::new(3, Duration::from_secs(30));
        cb.record_failure("b1");
        cb.record_failure("b1");
        cb.record_success("b1");
        cb.record_failure("b1");
        assert_eq!(cb.admit("b1"), Admission::Allowed);
    }

    #[test]
    fn open_rejects_until_timeout_elapses() {
        let cb = CircuitBreaker::new(1, Duration::from_millis(20));
        cb.record_failure("b1");
        assert_eq!(cb.admit("b1"), Admission::Rejected);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cb.admit("b1"), Admission::Probe);
    }

    #[test]
    fn half_open_admits_single_probe() {
        let cb = CircuitBreaker::new(1, Duration::from_millis(10));
        cb.record_failure("b1");
        std::thread::sleep(Duration::from_millis(15));
        assert_eq!(cb.admit("b1"), Admission::Probe);
        assert_eq!(cb.admit("b1"), Admission::Rejected);
    }

    #[test]
    fn probe_success_closes_breaker() {
        let cb = CircuitBreaker::new(1, Duration::from_millis(10));
        cb.record_failure("b1");
        std::thread::sleep(Duration::from_millis(15));
        assert_eq!(cb.admit("b1"), Admission::Probe);
        cb.record_probe_result("b1", true);
        assert_eq!(cb.admit("b1"), Admission::Allowed);
    }

    #[test]
    fn probe_failure_reopens_and_resets_timer() {
        let cb = CircuitBreaker::new(1, Duration::from_millis(20));
        cb.record_failure("b1");
        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(cb.admit("b1"), Admission::Probe);
        cb.record_probe_result("b1", false);
        assert_eq!(cb.admit("b1"), Admission::Rejected);
    }

    #[test]
    fn unknown_backend_starts_closed() {
        let cb = CircuitBreaker::with_defaults();
        assert_eq!(cb.admit("never-seen"), Admission::Allowed);
    }
}
