//! Bounded retry with exponential backoff and jitter.
//!
//! Wraps a fallible async operation and re-invokes it until it succeeds,
//! the attempt budget is exhausted, or the caller's predicate declares the
//! error non-retryable. The delay between attempts grows geometrically,
//! is capped at a configurable ceiling, and carries ±15% jitter so that
//! many clients recovering from the same outage don't retry in lockstep.
//!
//! No delay is inserted before the first attempt, and the final error is
//! propagated unchanged.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Jitter applied to every backoff sleep, as a fraction of the delay.
const JITTER_FRACTION: f64 = 0.15;

/// Configuration for [`retry`] behavior.
///
/// # Fields
///
/// - `max_attempts`: total invocations of the wrapped operation, including
///   the first (default: 3)
/// - `initial_delay`: delay before the second attempt (default: 250ms)
/// - `max_delay`: ceiling for the backoff delay (default: 10s)
/// - `backoff_multiplier`: growth factor between attempts (default: 2.0)
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of invocations of the wrapped operation.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Ceiling for the computed delay (caps exponential growth).
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy that invokes the operation exactly once (no retries).
    pub fn no_retries() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// Run `op` under `policy`, retrying failures accepted by `is_retryable`.
///
/// The operation is invoked at most `policy.max_attempts` times. Between
/// attempts the current delay is jittered by ±15%, slept, then multiplied
/// by `backoff_multiplier` and clamped to `max_delay`. A non-retryable
/// error or an exhausted budget returns the last error unchanged.
pub async fn retry<T, E, F, Fut, P>(policy: &RetryPolicy, is_retryable: P, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut delay = policy.initial_delay;

    for attempt in 1..=max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt == max_attempts || !is_retryable(&err) {
                    return Err(err);
                }
                let wait = jittered(delay, policy.max_delay);
                debug!(
                    attempt,
                    max_attempts,
                    wait_ms = wait.as_millis() as u64,
                    "operation failed, backing off before retry"
                );
                sleep(wait).await;
                delay = next_delay(delay, policy);
            }
        }
    }

    unreachable!("loop returns on the final attempt")
}

/// Apply ±15% jitter to `delay`, clamped to `ceiling`.
fn jittered(delay: Duration, ceiling: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(1.0 - JITTER_FRACTION..=1.0 + JITTER_FRACTION);
    delay.mul_f64(factor).min(ceiling)
}

/// Grow the delay geometrically, clamped to the policy ceiling.
fn next_delay(delay: Duration, policy: &RetryPolicy) -> Duration {
    delay
        .mul_f64(policy.backoff_multiplier.max(1.0))
        .min(policy.max_delay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn counting_op(
        counter: Arc<AtomicU32>,
        failures: u32,
    ) -> impl FnMut() -> std::future::Ready<Result<u32, String>> {
        move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= failures {
                std::future::ready(Err(format!("boom {}", n)))
            } else {
                std::future::ready(Ok(n))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let counter = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::default();

        let result = retry(&policy, |_| true, counting_op(counter.clone(), 2)).await;

        assert_eq!(result, Ok(3));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_returns_last_error() {
        let counter = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy {
            max_attempts: 2,
            ..RetryPolicy::default()
        };

        let result = retry(&policy, |_| true, counting_op(counter.clone(), u32::MAX)).await;

        assert_eq!(result, Err("boom 2".to_string()));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_short_circuits() {
        let counter = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::default();

        let result = retry(&policy, |_| false, counting_op(counter.clone(), u32::MAX)).await;

        assert_eq!(result, Err("boom 1".to_string()));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn first_attempt_has_no_delay() {
        let counter = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::default();
        let start = tokio::time::Instant::now();

        let result = retry(&policy, |_| true, counting_op(counter.clone(), 0)).await;

        assert_eq!(result, Ok(1));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn single_attempt_policy_never_sleeps() {
        let counter = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::no_retries();
        let start = tokio::time::Instant::now();

        let result = retry(&policy, |_| true, counting_op(counter.clone(), u32::MAX)).await;

        assert_eq!(result, Err("boom 1".to_string()));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_waits_stay_within_jitter_bounds() {
        let counter = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        };
        let start = tokio::time::Instant::now();

        let result = retry(&policy, |_| true, counting_op(counter.clone(), 2)).await;
        assert_eq!(result, Ok(3));

        // Two sleeps: ~100ms and ~200ms, each jittered by at most ±15%.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(255), "elapsed {:?}", elapsed);
        assert!(elapsed <= Duration::from_millis(345), "elapsed {:?}", elapsed);
    }

    #[test]
    fn next_delay_clamps_at_ceiling() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        };

        assert_eq!(
            next_delay(Duration::from_secs(4), &policy),
            Duration::from_secs(5)
        );
        assert_eq!(
            next_delay(Duration::from_secs(5), &policy),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn jittered_stays_within_bounds() {
        let delay = Duration::from_millis(1000);
        for _ in 0..100 {
            let wait = jittered(delay, Duration::from_secs(10));
            assert!(wait >= Duration::from_millis(850), "wait {:?}", wait);
            assert!(wait <= Duration::from_millis(1150), "wait {:?}", wait);
        }
    }

    #[test]
    fn jittered_respects_ceiling() {
        let delay = Duration::from_secs(10);
        for _ in 0..100 {
            let wait = jittered(delay, Duration::from_secs(10));
            assert!(wait <= Duration::from_secs(10));
        }
    }
}
