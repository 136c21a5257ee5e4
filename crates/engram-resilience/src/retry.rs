//! Exponential backoff with jitter.
//!
//! Jitter uses `std::time::SystemTime` UNIX nanos as a seed to avoid
//! requiring the `rand` crate outside tests.

use serde::{Deserialize, Serialize};

/// Configuration for retry behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Additional attempts after the first (r). Total attempts = r + 1.
    pub max_retries: u32,
    /// Backoff base: delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Cap on any single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Jitter factor (0.0 = none, 1.0 = up to +100% of the delay).
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 50,
            max_delay_ms: 5_000,
            jitter: 0.2,
        }
    }
}

/// Compute the delay before retry number `attempt` (0-indexed).
///
/// Formula: `min(base * 2^attempt, max) * (1 + random_fraction * jitter)`,
/// clamped back to `max_delay_ms`.
pub fn compute_backoff(config: &RetryConfig, attempt: u32) -> u64 {
    let base = config
        .base_delay_ms
        .saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX));
    let capped = base.min(config.max_delay_ms);

    if config.jitter <= 0.0 {
        return capped;
    }

    let frac = pseudo_random_fraction();
    let with_jitter = (capped as f64) * (1.0 + frac * config.jitter);
    (with_jitter as u64).min(config.max_delay_ms)
}

/// A pseudo-random fraction in `[0, 1)` from the system clock nanos. Not
/// cryptographically secure; good enough to de-correlate retry storms.
fn pseudo_random_fraction() -> f64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    let mixed = nanos.wrapping_mul(2654435761); // Knuth multiplicative hash
    (mixed as f64) / (u32::MAX as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter(base: u64, max: u64) -> RetryConfig {
        RetryConfig {
            max_retries: 5,
            base_delay_ms: base,
            max_delay_ms: max,
            jitter: 0.0,
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let config = no_jitter(100, 100_000);
        assert_eq!(compute_backoff(&config, 0), 100);
        assert_eq!(compute_backoff(&config, 1), 200);
        assert_eq!(compute_backoff(&config, 2), 400);
        assert_eq!(compute_backoff(&config, 3), 800);
    }

    #[test]
    fn test_backoff_capped() {
        let config = no_jitter(1_000, 5_000);
        assert_eq!(compute_backoff(&config, 2), 4_000);
        assert_eq!(compute_backoff(&config, 3), 5_000);
        assert_eq!(compute_backoff(&config, 30), 5_000);
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let config = RetryConfig {
            max_retries: 2,
            base_delay_ms: 100,
            max_delay_ms: 10_000,
            jitter: 0.5,
        };
        for attempt in 0..4 {
            let delay = compute_backoff(&config, attempt);
            let floor = 100u64 << attempt;
            assert!(delay >= floor);
            assert!(delay <= (floor as f64 * 1.5) as u64 + 1);
        }
    }

    #[test]
    fn test_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.base_delay_ms, 50);
    }
}
