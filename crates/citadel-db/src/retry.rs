//! Retry with exponential backoff for transient store failures.
//!
//! - Backoff before retry `n` is `initial_backoff * multiplier^(n-1)`,
//!   capped at `max_backoff`.
//! - Each delay is jittered by up to `jitter_pct` percent either way.
//! - Permanent errors return immediately. Running out of attempts on a
//!   transient error returns [`StoreError::RetryExhausted`].

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::StoreError;

/// Backoff parameters for [`with_retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound on any single delay.
    pub max_backoff: Duration,
    /// Factor applied to the delay after each retry.
    pub multiplier: u32,
    /// Jitter as a percentage of the delay, applied in both directions.
    pub jitter_pct: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(25),
            max_backoff: Duration::from_secs(1),
            multiplier: 2,
            jitter_pct: 20,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// The un-jittered delay before retry number `retry` (1-based).
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1);
        let factor = self.multiplier.max(1).checked_pow(exponent).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Run `operation` until it succeeds, fails permanently, or the policy's
/// attempts are used up.
///
/// `op_name` labels log lines and the [`StoreError::RetryExhausted`] error.
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    op_name: &str,
    mut operation: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt: u32 = 0;

    loop {
        attempt = attempt.saturating_add(1);

        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_transient() {
            return Err(err);
        }

        if attempt >= max_attempts {
            tracing::warn!(
                operation = op_name,
                attempts = attempt,
                error = %err,
                "retries exhausted"
            );
            return Err(StoreError::RetryExhausted {
                operation: op_name.to_owned(),
                attempts: attempt,
                last_error: err.to_string(),
            });
        }

        let delay = apply_jitter(policy.backoff_for(attempt), policy.jitter_pct);
        tracing::debug!(
            operation = op_name,
            attempt,
            backoff_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "retrying after backoff"
        );
        tokio::time::sleep(delay).await;
    }
}

fn apply_jitter(delay: Duration, jitter_pct: u32) -> Duration {
    let pct = jitter_pct.min(100);
    if pct == 0 {
        return delay;
    }
    let roll = rand::rng().random_range(0..=pct.saturating_mul(2));
    let scale = 100_u32.saturating_sub(pct).saturating_add(roll);
    delay
        .saturating_mul(scale)
        .checked_div(100)
        .unwrap_or(delay)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            multiplier: 2,
            jitter_pct: 0,
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(25),
            max_backoff: Duration::from_millis(150),
            multiplier: 2,
            jitter_pct: 0,
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(25));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(50));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(4), Duration::from_millis(150));
        assert_eq!(policy.backoff_for(40), Duration::from_millis(150));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let base = Duration::from_millis(100);
        for _ in 0..200 {
            let d = apply_jitter(base, 20);
            assert!(d >= Duration::from_millis(80) && d <= Duration::from_millis(120));
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result = with_retry(&fast_policy(4), "flaky", move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(StoreError::Unavailable(String::from("blip")))
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: Result<(), _> = with_retry(&fast_policy(4), "dup", move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(StoreError::Corrupt(String::from("bad row")))
            }
        })
        .await;
        assert!(matches!(result, Err(StoreError::Corrupt(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_reports_attempts() {
        let result: Result<(), _> = with_retry(&fast_policy(3), "insert_claim", || async {
            Err(StoreError::Unavailable(String::from("down")))
        })
        .await;
        match result {
            Err(StoreError::RetryExhausted {
                operation,
                attempts,
                ..
            }) => {
                assert_eq!(operation, "insert_claim");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected RetryExhausted, got {other:?}"),
        }
    }
}
