//! Bounded retry with exponential backoff and jitter.
//!
//! The first attempt runs immediately. After failed attempt `k` (while
//! attempts remain) the runner waits
//! `min(base_delay * 2^(k-1) + jitter, max_delay)` with jitter drawn
//! fresh from `[0, policy.jitter]`. Waits and in-flight attempts are
//! abandoned as soon as the shutdown token fires.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

/// Retry bounds applied uniformly to every action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first (≥ 1).
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the random jitter added to each delay.
    pub jitter: Duration,
}

/// Source of per-attempt jitter.
pub trait Jitter: Send + Sync {
    /// A duration in `[0, max]`.
    fn sample(&mut self, max: Duration) -> Duration;
}

/// Uniform random jitter from the thread RNG.
#[derive(Debug, Default)]
pub struct RandomJitter;

impl Jitter for RandomJitter {
    fn sample(&mut self, max: Duration) -> Duration {
        let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}

/// Why a retried operation gave up.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E: std::error::Error + 'static> {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: E,
    },
    #[error("cancelled")]
    Cancelled,
}

/// Delay before the retry that follows failed attempt `failed_attempt` (1-based).
pub fn backoff_delay(policy: &RetryPolicy, failed_attempt: u32, jitter: Duration) -> Duration {
    // 2^(attempt-1), saturating instead of overflowing.
    let exponent = failed_attempt.saturating_sub(1);
    let multiplier = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
    policy
        .base_delay
        .saturating_mul(multiplier)
        .saturating_add(jitter)
        .min(policy.max_delay)
}

/// Run `attempt` until it succeeds, attempts run out, or shutdown.
///
/// `operation` names the work in logs.
pub async fn run_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    jitter: &mut dyn Jitter,
    shutdown: &CancellationToken,
    operation: &str,
    mut attempt: F,
) -> Result<T, RetryError<E>>
where
    E: std::error::Error + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut n = 1;

    loop {
        tracing::debug!(operation, attempt = n, max_attempts, "attempting");

        let result = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Err(RetryError::Cancelled),
            result = attempt() => result,
        };

        let error = match result {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if n >= max_attempts {
            tracing::warn!(operation, attempts = n, error = %error, "giving up");
            return Err(RetryError::Exhausted {
                attempts: n,
                last: error,
            });
        }

        let delay = backoff_delay(policy, n, jitter.sample(policy.jitter));
        tracing::warn!(
            operation,
            attempt = n,
            error = %error,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "attempt failed, backing off"
        );

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Err(RetryError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
        n += 1;
    }
}
