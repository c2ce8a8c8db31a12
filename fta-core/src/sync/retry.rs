use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::errors::CoreResult;

/// Bounded exponential backoff for remote calls.
///
/// Only errors reporting [`CoreError::is_retryable`](crate::CoreError::is_retryable)
/// are retried; validation and not-found failures come straight back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// One attempt, no waiting.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay after the given 1-based failed attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Runs `call` until it succeeds, fails permanently, or attempts run out.
    /// Returns the final result and the number of attempts made.
    pub async fn run<T, F, Fut>(&self, label: &str, mut call: F) -> (CoreResult<T>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CoreResult<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match call().await {
                Ok(value) => return (Ok(value), attempt),
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = self.delay_for_attempt(attempt);
                    debug!(
                        "{} failed on attempt {}/{}, retrying in {:?}: {}",
                        label, attempt, max_attempts, delay, err
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(err) => {
                    warn!("{} failed after {} attempt(s): {}", label, attempt, err);
                    return (Err(err), attempt);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CoreError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_retries_transient_errors_until_success() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        };
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let (result, attempts) = policy
            .run("flaky", move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(CoreError::unavailable("offline"))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let (result, attempts): (CoreResult<()>, u32) = policy
            .run("invalid", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(CoreError::validation("bad label"))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
