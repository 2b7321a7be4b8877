//! Retry-with-backoff executor.
//!
//! A pure control-flow combinator: classification comes from the error
//! taxonomy (`AppError::is_retryable`), backoff is exponential with a cap
//! and up to one second of random jitter.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::domain::AppError;

/// Retry budget and delay shape for one wrapped operation
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt (total attempts = max_retries + 1)
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// Delay before the retry following `attempt` (0-based), jitter included.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2_u32.saturating_pow(attempt))
            .min(self.max_delay);
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..1000));
        exp + jitter
    }
}

/// Run `operation`, retrying on retryable errors with exponential backoff.
///
/// Non-retryable errors surface immediately without a delay; on exhausting
/// the budget the last error propagates unchanged.
pub async fn execute_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    for attempt in 0..=policy.max_retries {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt == policy.max_retries || !error.is_retryable() {
                    return Err(error);
                }

                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    attempt = attempt + 1,
                    total = policy.max_retries + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }

    unreachable!("loop returns on success or final attempt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BlockchainError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> AppError {
        AppError::Blockchain(BlockchainError::Transient("connection reset".into()))
    }

    fn fatal() -> AppError {
        AppError::Blockchain(BlockchainError::InsufficientFunds)
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(3, Duration::from_millis(10), Duration::from_secs(1));

        let calls_clone = Arc::clone(&calls);
        let result = execute_with_retry(&policy, move || {
            let calls = Arc::clone(&calls_clone);
            async move {
                // Fails exactly twice, then succeeds
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(transient())
                } else {
                    Ok(42u32)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_short_circuits() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(5, Duration::from_millis(10), Duration::from_secs(1));

        let calls_clone = Arc::clone(&calls);
        let result: Result<u32, _> = execute_with_retry(&policy, move || {
            let calls = Arc::clone(&calls_clone);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(fatal())
            }
        })
        .await;

        assert!(matches!(
            result,
            Err(AppError::Blockchain(BlockchainError::InsufficientFunds))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_propagates_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(2, Duration::from_millis(10), Duration::from_secs(1));

        let calls_clone = Arc::clone(&calls);
        let result: Result<u32, _> = execute_with_retry(&policy, move || {
            let calls = Arc::clone(&calls_clone);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(transient())
            }
        })
        .await;

        assert!(matches!(
            result,
            Err(AppError::Blockchain(BlockchainError::Transient(_)))
        ));
        // Initial attempt + 2 retries
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_delay_is_capped_with_bounded_jitter() {
        let policy = RetryPolicy::new(10, Duration::from_secs(2), Duration::from_secs(30));

        // 2 * 2^10 seconds would blow far past the cap
        let delay = policy.delay_for_attempt(10);
        assert!(delay >= Duration::from_secs(30));
        assert!(delay < Duration::from_secs(31));

        let first = policy.delay_for_attempt(0);
        assert!(first >= Duration::from_secs(2));
        assert!(first < Duration::from_secs(3));
    }
}
