// =============================================================================
// circuit_breaker.rs — KNOWING WHEN TO STOP ASKING
// =============================================================================
//
// The document server belongs to a public body and it has bad days. When
// every request is failing, retrying each document three times just turns
// one outage into a few thousand angry log lines and possibly an IP ban.
//
// So retrieval goes through a breaker:
//
//   CLOSED      requests flow. Consecutive failures are counted.
//   OPEN        after N consecutive failures. Nothing goes out until the
//               reset timeout has passed since the last failure.
//   HALF_OPEN   probes are let through. M successes close the breaker,
//               a single failure opens it again.
// =============================================================================

use parking_lot::RwLock;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    probe_successes: u32,
    last_failure: Option<Instant>,
    last_transition: Instant,
    trips: u64,
    rejected: u64,
}

impl BreakerState {
    fn transition(&mut self, to: CircuitState) {
        self.state = to;
        self.last_transition = Instant::now();
    }
}

/// A thread-safe circuit breaker guarding one upstream.
pub struct CircuitBreaker {
    /// Which upstream this guards, for logs.
    name: String,
    state: RwLock<BreakerState>,
    failure_threshold: u32,
    reset_timeout: Duration,
    success_threshold: u32,
}

impl CircuitBreaker {
    pub fn new(
        name: impl Into<String>,
        failure_threshold: u32,
        reset_timeout: Duration,
        success_threshold: u32,
    ) -> Self {
        let name = name.into();
        info!(
            name = %name,
            failure_threshold,
            reset_timeout_secs = reset_timeout.as_secs(),
            success_threshold,
            "Circuit breaker armed"
        );

        Self {
            name,
            state: RwLock::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                probe_successes: 0,
                last_failure: None,
                last_transition: Instant::now(),
                trips: 0,
                rejected: 0,
            }),
            // A zero threshold would trip on nothing and never close.
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
            success_threshold: success_threshold.max(1),
        }
    }

    /// Breaker with the thresholds from `config`.
    pub fn from_config(name: impl Into<String>, config: &Config) -> Self {
        Self::new(
            name,
            config.circuit_breaker_failure_threshold,
            config.circuit_breaker_reset_timeout,
            config.circuit_breaker_success_threshold,
        )
    }

    /// Whether a request may go out now. An open breaker whose timeout
    /// has elapsed moves to half-open and lets the probe through.
    pub fn allow_request(&self) -> bool {
        let mut s = self.state.write();

        match s.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = s.last_failure.map(|t| t.elapsed()).unwrap_or(self.reset_timeout);
                if elapsed >= self.reset_timeout {
                    info!(name = %self.name, "Circuit breaker OPEN -> HALF_OPEN, probing upstream");
                    s.probe_successes = 0;
                    s.transition(CircuitState::HalfOpen);
                    true
                } else {
                    s.rejected += 1;
                    let remaining = self.reset_timeout - elapsed;
                    warn!(
                        name = %self.name,
                        remaining_secs = remaining.as_secs(),
                        "Circuit breaker OPEN, request blocked"
                    );
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut s = self.state.write();

        match s.state {
            CircuitState::Closed => s.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                s.probe_successes += 1;
                if s.probe_successes >= self.success_threshold {
                    info!(
                        name = %self.name,
                        successes = s.probe_successes,
                        "Circuit breaker HALF_OPEN -> CLOSED, upstream healthy"
                    );
                    s.consecutive_failures = 0;
                    s.probe_successes = 0;
                    s.transition(CircuitState::Closed);
                }
            }
            // A request that started before the trip finished late.
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut s = self.state.write();
        s.last_failure = Some(Instant::now());

        match s.state {
            CircuitState::Closed => {
                s.consecutive_failures += 1;
                if s.consecutive_failures >= self.failure_threshold {
                    warn!(
                        name = %self.name,
                        failures = s.consecutive_failures,
                        "Circuit breaker TRIPPED, CLOSED -> OPEN"
                    );
                    s.trips += 1;
                    s.transition(CircuitState::Open);
                } else {
                    warn!(
                        name = %self.name,
                        failures = s.consecutive_failures,
                        threshold = self.failure_threshold,
                        "Upstream failure recorded"
                    );
                }
            }
            CircuitState::HalfOpen => {
                warn!(name = %self.name, "Probe failed, HALF_OPEN -> OPEN");
                s.consecutive_failures = self.failure_threshold;
                s.trips += 1;
                s.transition(CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state.read().state
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let s = self.state.read();
        CircuitBreakerSnapshot {
            name: self.name.clone(),
            state: s.state,
            consecutive_failures: s.consecutive_failures,
            trips: s.trips,
            rejected_requests: s.rejected,
            secs_in_state: s.last_transition.elapsed().as_secs(),
        }
    }
}

/// Serializable view of a breaker, included in run reports.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CircuitBreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub trips: u64,
    pub rejected_requests: u64,
    pub secs_in_state: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_closed() {
        let cb = CircuitBreaker::new("docs", 3, Duration::from_secs(5), 2);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow_request());
    }

    #[test]
    fn test_trips_after_threshold_failures() {
        let cb = CircuitBreaker::new("docs", 3, Duration::from_secs(5), 2);
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow_request());

        let snap = cb.snapshot();
        assert_eq!(snap.trips, 1);
        assert_eq!(snap.rejected_requests, 1);
    }

    #[test]
    fn test_success_resets_failure_count() {
        let cb = CircuitBreaker::new("docs", 3, Duration::from_secs(5), 2);
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_probe_cycle() {
        let cb = CircuitBreaker::new("docs", 1, Duration::ZERO, 2);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        // Zero timeout: the next request is a probe.
        assert!(cb.allow_request());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_failed_probe_reopens() {
        let cb = CircuitBreaker::new("docs", 1, Duration::ZERO, 2);
        cb.record_failure();
        assert!(cb.allow_request());
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.snapshot().trips, 2);
    }

    #[test]
    fn test_from_config() {
        let cb = CircuitBreaker::from_config("docs", &Config::default());
        assert_eq!(cb.name(), "docs");
        for _ in 0..5 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
