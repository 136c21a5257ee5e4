//! CLOSED/OPEN/HALF_OPEN circuit breaker.
//!
//! One breaker per logical endpoint, shared across all callers. All
//! transitions happen under a single mutex so concurrent callers never
//! double-count or lose a failure/success event.

use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Configuration for breaker behavior.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures (k) before the breaker trips to OPEN.
    pub failure_threshold: u32,
    /// Cool-down before an OPEN breaker allows a HALF_OPEN probe, in
    /// milliseconds.
    pub cooldown_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_ms: 30_000,
        }
    }
}

impl BreakerConfig {
    fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Internal breaker state.
#[derive(Debug, Clone)]
enum State {
    /// Healthy; counting consecutive failures.
    Closed { failures: u32 },
    /// Tripped; rejecting calls until the cool-down elapses.
    Open { opened_at: Instant },
    /// One probe is in flight; everyone else is rejected.
    HalfOpen,
}

/// What a permitted call is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permit {
    /// Normal call: the full retry budget applies.
    Normal,
    /// The single HALF_OPEN probe: exactly one attempt, no retries.
    Probe,
}

/// Read-only snapshot for observability.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    /// The endpoint this breaker guards.
    pub endpoint: String,
    /// `"closed"`, `"open"`, or `"half_open"`.
    pub state: String,
    /// Current consecutive-failure count (0 unless closed).
    pub consecutive_failures: u32,
}

/// Per-endpoint circuit breaker.
pub struct CircuitBreaker {
    endpoint: String,
    config: BreakerConfig,
    state: Mutex<State>,
}

impl CircuitBreaker {
    /// Create a closed breaker for an endpoint.
    pub fn new(endpoint: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            endpoint: endpoint.into(),
            config,
            state: Mutex::new(State::Closed { failures: 0 }),
        }
    }

    /// The endpoint this breaker guards.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Ask to make a call.
    ///
    /// - CLOSED: permitted, normal retry budget.
    /// - OPEN, cool-down elapsed: transitions to HALF_OPEN and permits
    ///   exactly this caller a single probe.
    /// - OPEN, cool-down pending, or HALF_OPEN with a probe already out:
    ///   rejected with the remaining cool-down in milliseconds.
    pub fn try_acquire(&self) -> Result<Permit, u64> {
        let mut state = self.state.lock();
        match *state {
            State::Closed { .. } => Ok(Permit::Normal),
            State::Open { opened_at } => {
                let elapsed = opened_at.elapsed();
                let cooldown = self.config.cooldown();
                if elapsed >= cooldown {
                    debug!(endpoint = %self.endpoint, "cool-down elapsed, allowing half-open probe");
                    *state = State::HalfOpen;
                    Ok(Permit::Probe)
                } else {
                    Err((cooldown - elapsed).as_millis() as u64)
                }
            }
            State::HalfOpen => Err(0),
        }
    }

    /// Whether a call would currently be rejected. Used to bail out of a
    /// retry loop when the breaker trips mid-call.
    pub fn is_open(&self) -> bool {
        let state = self.state.lock();
        match *state {
            State::Closed { .. } => false,
            State::Open { opened_at } => opened_at.elapsed() < self.config.cooldown(),
            State::HalfOpen => false,
        }
    }

    /// Record a successful attempt: resets the failure counter; a successful
    /// probe closes the breaker.
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        if matches!(*state, State::HalfOpen) {
            debug!(endpoint = %self.endpoint, "probe succeeded, closing breaker");
        }
        *state = State::Closed { failures: 0 };
    }

    /// Record a failed attempt. The k-th consecutive failure trips the
    /// breaker; a failed probe reopens it and restarts the cool-down.
    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        match *state {
            State::Closed { failures } => {
                let failures = failures + 1;
                if failures >= self.config.failure_threshold {
                    warn!(
                        endpoint = %self.endpoint,
                        failures,
                        "failure threshold reached, opening breaker"
                    );
                    *state = State::Open {
                        opened_at: Instant::now(),
                    };
                } else {
                    *state = State::Closed { failures };
                }
            }
            State::HalfOpen => {
                warn!(endpoint = %self.endpoint, "probe failed, reopening breaker");
                *state = State::Open {
                    opened_at: Instant::now(),
                };
            }
            State::Open { .. } => {}
        }
    }

    /// Force the breaker back to CLOSED with a zeroed counter.
    pub fn reset(&self) {
        *self.state.lock() = State::Closed { failures: 0 };
    }

    /// Snapshot for stats reporting.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let state = self.state.lock();
        let (name, failures) = match *state {
            State::Closed { failures } => ("closed", failures),
            State::Open { .. } => ("open", 0),
            State::HalfOpen => ("half_open", 0),
        };
        BreakerSnapshot {
            endpoint: self.endpoint.clone(),
            state: name.to_string(),
            consecutive_failures: failures,
        }
    }
}
