// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry logic with exponential backoff and per-attempt timeouts.
//!
//! # Example
//!
//! ```
//! use offline_sync::RetryConfig;
//!
//! // Startup: fail fast on a bad database path
//! let startup = RetryConfig::startup();
//! assert_eq!(startup.max_retries, Some(5));
//!
//! // Transport: a few quick retries, then let the queue try next cycle
//! let transport = RetryConfig::transport();
//! assert_eq!(transport.max_retries, Some(3));
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

/// Configuration for operation retry behavior.
///
/// `max_retries` is the total number of attempts; `None` retries forever.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    pub max_retries: Option<usize>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::transport()
    }
}

impl RetryConfig {
    /// Fast-fail retry for opening local storage.
    /// Attempts 5 times with exponential backoff, failing after ~5 seconds.
    #[must_use]
    pub fn startup() -> Self {
        Self {
            max_retries: Some(5),
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
        }
    }

    /// Quick retry for a single sync request.
    #[must_use]
    pub fn transport() -> Self {
        Self {
            max_retries: Some(3),
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            factor: 2.0,
        }
    }

    /// Fast retry for tests (minimal delays)
    #[cfg(test)]
    #[must_use]
    pub fn test() -> Self {
        Self {
            max_retries: Some(3),
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            factor: 2.0,
        }
    }

    /// Delay before the attempt following `delay`.
    #[must_use]
    pub fn next_delay(&self, delay: Duration) -> Duration {
        delay.mul_f64(self.factor).min(self.max_delay)
    }
}

pub async fn retry<F, Fut, T, E>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = config.initial_delay;
    let mut attempts = 0;

    loop {
        match operation().await {
            Ok(val) => {
                if attempts > 0 {
                    info!("Operation '{}' succeeded after {} retries", operation_name, attempts);
                }
                return Ok(val);
            }
            Err(err) => {
                attempts += 1;

                match config.max_retries {
                    Some(max) if attempts >= max => return Err(err),
                    Some(max) => warn!(
                        "Operation '{}' failed (attempt {}/{}): {}. Retrying in {:?}...",
                        operation_name, attempts, max, err, delay
                    ),
                    None => warn!(
                        "Operation '{}' failed (attempt {}, will retry forever): {}. Next retry in {:?}...",
                        operation_name, attempts, err, delay
                    ),
                }

                sleep(delay).await;
                delay = config.next_delay(delay);
            }
        }
    }
}

/// Error from [`retry_with_timeout`]: either the operation's own error or
/// the per-attempt deadline.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError<E> {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Inner(E),
}

/// [`retry`] where every attempt is bounded by `per_attempt`.
pub async fn retry_with_timeout<F, Fut, T, E>(
    operation_name: &str,
    config: &RetryConfig,
    per_attempt: Duration,
    mut operation: F,
) -> Result<T, AttemptError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry(operation_name, config, || {
        let fut = operation();
        async move {
            match timeout(per_attempt, fut).await {
                Ok(Ok(val)) => Ok(val),
                Ok(Err(e)) => Err(AttemptError::Inner(e)),
                Err(_) => Err(AttemptError::Timeout(per_attempt)),
            }
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct TestError(String);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_first_try() {
        let result: Result<i32, TestError> = retry(
            "test_op",
            &RetryConfig::test(),
            || async { Ok(42) },
        ).await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<i32, TestError> = retry(
            "test_op",
            &RetryConfig::test(),
            || {
                let a = attempts_clone.clone();
                async move {
                    let count = a.fetch_add(1, Ordering::SeqCst) + 1;
                    if count < 3 {
                        Err(TestError(format!("fail {}", count)))
                    } else {
                        Ok(42)
                    }
                }
            },
        ).await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausts_retries() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<i32, TestError> = retry(
            "test_op",
            &RetryConfig::test(),
            || {
                let a = attempts_clone.clone();
                async move {
                    a.fetch_add(1, Ordering::SeqCst);
                    Err(TestError("always fail".to_string()))
                }
            },
        ).await;

        assert!(result.unwrap_err().0.contains("always fail"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_with_timeout_reports_timeout() {
        let result: Result<(), AttemptError<TestError>> = retry_with_timeout(
            "slow_op",
            &RetryConfig::test(),
            Duration::from_millis(5),
            || async {
                sleep(Duration::from_secs(5)).await;
                Ok(())
            },
        ).await;

        assert!(matches!(result, Err(AttemptError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_retry_with_timeout_passes_inner_error() {
        let result: Result<(), AttemptError<TestError>> = retry_with_timeout(
            "failing_op",
            &RetryConfig::test(),
            Duration::from_secs(1),
            || async { Err(TestError("rejected".into())) },
        ).await;

        match result {
            Err(AttemptError::Inner(e)) => assert_eq!(e.0, "rejected"),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_delay_exponential_backoff() {
        let config = RetryConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            factor: 2.0,
            max_retries: Some(5),
        };

        let mut delay = config.initial_delay;
        assert_eq!(delay, Duration::from_millis(100));

        delay = config.next_delay(delay);
        assert_eq!(delay, Duration::from_millis(200));

        delay = config.next_delay(delay);
        assert_eq!(delay, Duration::from_millis(400));
    }

    #[test]
    fn test_delay_caps_at_max() {
        let config = RetryConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            factor: 10.0,
            max_retries: Some(5),
        };

        assert_eq!(config.next_delay(config.initial_delay), Duration::from_secs(5));
    }
}
