//! Retry with exponential backoff
//!
//! Media providers fail transiently (timeouts, dropped connections). Those
//! failures are retried with a doubling delay; permanent failures (not
//! found, unavailable, unparseable) return immediately.

use crate::media::ExtractionError;
use std::future::Future;
use std::time::Duration;
use tunecast_common::config::ResolverConfig;

/// Backoff parameters
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self {
            attempts: config.retry_attempts.max(1),
            initial_backoff: Duration::from_millis(config.retry_initial_backoff_ms),
            max_backoff: Duration::from_millis(config.retry_max_backoff_ms),
        }
    }

    /// Single attempt, no waiting
    pub fn none() -> Self {
        Self {
            attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ResolverConfig::default())
    }
}

/// Run `operation` until it succeeds, fails permanently, or attempts run out
///
/// # Arguments
/// * `operation_name` - Name for logging (e.g., "stream resolution")
/// * `policy` - Attempt count and backoff bounds
/// * `operation` - Async closure performing one attempt
pub async fn retry_with_backoff<F, Fut, T>(
    operation_name: &str,
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, ExtractionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ExtractionError>>,
{
    let mut attempt = 0;
    let mut backoff = policy.initial_backoff;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) if !err.is_transient() => return Err(err),
            Err(err) if attempt >= policy.attempts => {
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    error = %err,
                    "Retries exhausted"
                );
                return Err(err);
            }
            Err(err) => {
                let wait = backoff.min(policy.max_backoff);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms = wait.as_millis() as u64,
                    error = %err,
                    "Transient failure, will retry after backoff"
                );
                tokio::time::sleep(wait).await;
                backoff = (backoff * 2).min(policy.max_backoff);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::ExtractionErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_first_attempt() {
        let result = retry_with_backoff("test_op", fast_policy(3), || async {
            Ok::<i32, ExtractionError>(42)
        })
        .await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_errors() {
        let calls = AtomicU32::new(0);

        let result = retry_with_backoff("test_op", fast_policy(3), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ExtractionError::new(ExtractionErrorKind::Timeout, "slow"))
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
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = retry_with_backoff("test_op", fast_policy(5), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ExtractionError::new(ExtractionErrorKind::NotFound, "gone")) }
        })
        .await;

        assert_eq!(result.unwrap_err().kind, ExtractionErrorKind::NotFound);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempts_exhausted_returns_last_error() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = retry_with_backoff("test_op", fast_policy(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ExtractionError::new(ExtractionErrorKind::Network, "reset")) }
        })
        .await;

        assert_eq!(result.unwrap_err().kind, ExtractionErrorKind::Network);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
