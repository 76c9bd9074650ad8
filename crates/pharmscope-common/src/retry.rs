//! Retry with exponential backoff for transient upstream failures.
//!
//! Shared by the AI call sites (keyword generation, per-record analysis)
//! and by source adapter pagination loops. Permanent errors return
//! immediately; transient ones back off and retry up to the configured
//! attempt cap.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Backoff parameters, read once from configuration at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first call.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_max_attempts() -> u32 { 4 }
fn default_base_delay_ms() -> u64 { 500 }
fn default_max_delay_ms() -> u64 { 8_000 }
fn default_multiplier() -> f64 { 2.0 }
fn default_jitter() -> bool { true }

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
        }
    }
}

/// Classification of an error for retry purposes.
pub trait Transient {
    /// Whether a later attempt could plausibly succeed.
    fn is_transient(&self) -> bool;

    /// Server-requested minimum wait before the next attempt, if any.
    fn retry_after_secs(&self) -> Option<u64> {
        None
    }
}

/// Runs `operation` until it succeeds, fails permanently, or exhausts
/// `policy.max_attempts`. The last error is returned on exhaustion.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    E: Transient + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt += 1;
                if !e.is_transient() || attempt >= max_attempts {
                    return Err(e);
                }
                let delay_ms = next_delay_ms(policy, attempt - 1, e.retry_after_secs());
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms,
                    error = %e,
                    "Transient failure, backing off before retry"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

/// Exponential backoff capped at `max_delay_ms`; a server retry-after
/// floors the computed delay.
fn next_delay_ms(policy: &RetryPolicy, completed_attempt: u32, retry_after_secs: Option<u64>) -> u64 {
    let base = policy.base_delay_ms as f64 * policy.multiplier.powi(completed_attempt as i32);
    let mut delay = base.min(policy.max_delay_ms as f64) as u64;
    if policy.jitter {
        // Add up to 25% jitter
        delay += (delay as f64 * 0.25 * clock_fraction()) as u64;
    }
    match retry_after_secs {
        Some(secs) => delay.max(secs.saturating_mul(1000)),
        None => delay,
    }
}

/// Pseudo-random fraction in [0, 1) derived from the subsecond clock.
fn clock_fraction() -> f64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct FlakyError {
        transient: bool,
    }

    impl fmt::Display for FlakyError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "flaky (transient: {})", self.transient)
        }
    }

    impl Transient for FlakyError {
        fn is_transient(&self) -> bool {
            self.transient
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 4,
            multiplier: 2.0,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn transient_failures_retry_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_policy(4), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(FlakyError { transient: true })
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failure_returns_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast_policy(4), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FlakyError { transient: false }) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast_policy(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FlakyError { transient: true }) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn delay_growth_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 250,
            multiplier: 2.0,
            jitter: false,
        };
        assert_eq!(next_delay_ms(&policy, 0, None), 100);
        assert_eq!(next_delay_ms(&policy, 1, None), 200);
        assert_eq!(next_delay_ms(&policy, 2, None), 250);
        assert_eq!(next_delay_ms(&policy, 6, None), 250);
    }

    #[test]
    fn retry_after_floors_the_delay() {
        let policy = RetryPolicy {
            jitter: false,
            ..RetryPolicy::default()
        };
        assert_eq!(next_delay_ms(&policy, 0, Some(3)), 3_000);
    }
}
