//! Bounded retry and circuit breaking around outbound calls.
//!
//! Wraps any call to a remote-backed store adapter or embedding/LLM
//! provider. Every call first consults the endpoint's [`CircuitBreaker`]:
//! an open breaker fails immediately without a network attempt. Permitted
//! calls run a bounded retry loop with exponential backoff; every attempt
//! outcome feeds the breaker's consecutive-failure counter.
//!
//! With independent per-attempt failure probability `p` and `r` retries,
//! overall success converges to `1 - p^(r+1)` and the trip rate within one
//! run of `k` consecutive failures to `p^k`.

pub mod breaker;
pub mod retry;

pub use breaker::{BreakerConfig, BreakerSnapshot, CircuitBreaker, Permit};
pub use retry::{compute_backoff, RetryConfig};

use std::future::Future;
use thiserror::Error;
use tracing::debug;

/// Failure from a resilience-wrapped call.
#[derive(Error, Debug)]
pub enum ResilienceError<E: std::error::Error> {
    /// Short-circuited by an open breaker; no attempt was made (or the
    /// breaker tripped mid-call and the retry budget was abandoned).
    #[error("circuit open for '{endpoint}', retry after {retry_after_ms}ms")]
    CircuitOpen {
        /// The guarded endpoint.
        endpoint: String,
        /// Remaining cool-down when the call was rejected.
        retry_after_ms: u64,
    },

    /// The final attempt's error, after the retry budget was spent or the
    /// error was classified non-retryable.
    #[error(transparent)]
    Inner(#[from] E),
}

/// Retry-with-backoff composed with a circuit breaker for one endpoint.
pub struct Resilience {
    breaker: CircuitBreaker,
    retry: RetryConfig,
}

impl Resilience {
    /// Build a wrapper for an endpoint.
    pub fn new(endpoint: impl Into<String>, retry: RetryConfig, breaker: BreakerConfig) -> Self {
        Self {
            breaker: CircuitBreaker::new(endpoint, breaker),
            retry,
        }
    }

    /// The underlying breaker (shared state for stats and tests).
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Execute `op` under the breaker and retry policy.
    ///
    /// `should_retry` classifies errors: transient ones burn a retry and
    /// feed the breaker's failure counter; anything else is a definitive
    /// answer from a healthy endpoint — it propagates immediately and counts
    /// as a success for breaker purposes. A HALF_OPEN probe gets exactly
    /// one attempt regardless of the retry budget.
    pub async fn call<T, E, F, Fut, P>(
        &self,
        mut op: F,
        should_retry: P,
    ) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::error::Error,
    {
        let permit = self
            .breaker
            .try_acquire()
            .map_err(|retry_after_ms| ResilienceError::CircuitOpen {
                endpoint: self.breaker.endpoint().to_string(),
                retry_after_ms,
            })?;

        let max_attempts = match permit {
            Permit::Probe => 1,
            Permit::Normal => self.retry.max_retries + 1,
        };

        let mut attempt = 0;
        loop {
            match op().await {
                Ok(result) => {
                    self.breaker.record_success();
                    if attempt > 0 {
                        debug!(
                            endpoint = %self.breaker.endpoint(),
                            attempt = attempt + 1,
                            "call succeeded after retries"
                        );
                    }
                    return Ok(result);
                }
                Err(err) => {
                    if !should_retry(&err) {
                        // The endpoint answered; the answer just wasn't
                        // what the caller wanted.
                        self.breaker.record_success();
                        return Err(ResilienceError::Inner(err));
                    }
                    self.breaker.record_failure();
                    attempt += 1;
                    if attempt >= max_attempts {
                        return Err(ResilienceError::Inner(err));
                    }
                    // The loop's failures may themselves have tripped the
                    // breaker; an open breaker means no further attempts.
                    if self.breaker.is_open() {
                        return Err(ResilienceError::CircuitOpen {
                            endpoint: self.breaker.endpoint().to_string(),
                            retry_after_ms: self.breaker.try_acquire().err().unwrap_or(0),
                        });
                    }
                    let delay = compute_backoff(&self.retry, attempt - 1);
                    debug!(
                        endpoint = %self.breaker.endpoint(),
                        attempt,
                        delay_ms = delay,
                        "retrying after transient failure"
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                }
            }
        }
    }
}
