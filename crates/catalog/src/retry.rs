//! Bounded retry with jittered exponential backoff.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// How hard to try before giving up on a transient failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}
impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
        }
    }
}
impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based): exponential growth
    /// capped at `max_delay`, then scaled into `[50%, 100%]` of that value.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.jittered_delay(attempt, &mut rand::rng())
    }

    fn jittered_delay(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let capped = self.base_delay.saturating_mul(1 << exponent).min(self.max_delay);
        capped.mul_f64(rng.random_range(0.5..=1.0))
    }
}

/// Run `op` until it succeeds, fails with an error `is_retryable` rejects,
/// or the policy's attempts are used up. The last error is returned as-is.
///
/// ```
/// # use tome_catalog::retry::{RetryPolicy, retry};
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut calls = 0;
/// let result: Result<u32, &str> = retry(&RetryPolicy::default(), |e| *e == "busy", || {
///     calls += 1;
///     let outcome = if calls < 3 { Err("busy") } else { Ok(calls) };
///     async move { outcome }
/// })
/// .await;
/// assert_eq!(result, Ok(3));
/// # }
/// ```
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, is_retryable: impl Fn(&E) -> bool, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_attempts && is_retryable(&err) => {
                let delay = policy.delay(attempt);
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "transient failure, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            },
            Err(err) => return Err(err),
        }
    }
}
