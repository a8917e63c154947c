//! Retry logic with a failure budget and free rate-limit retries
//!
//! A failed attempt either spends one unit of budget and waits
//! [`RetryConfig::retry_delay`], or, when the upstream signalled rate limiting,
//! waits [`RetryConfig::rate_limit_delay`] and retries without spending anything.
//! Rate-limited retries are unbounded: they stop only when the upstream stops
//! answering 429 or the cancellation token fires.
//!
//! # Example
//!
//! ```no_run
//! use manifest_dl::retry::{IsRateLimited, RetryError, retry_with_budget};
//! use manifest_dl::config::RetryConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Busy,
//!     Broken,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{self:?}")
//!     }
//! }
//!
//! impl IsRateLimited for MyError {
//!     fn is_rate_limited(&self) -> bool {
//!         matches!(self, MyError::Busy)
//!     }
//! }
//!
//! # async fn example() -> Result<(), RetryError<MyError>> {
//! let config = RetryConfig::default();
//! let cancel = CancellationToken::new();
//! let value = retry_with_budget(&config, &cancel, |_| {}, || async {
//!     Ok::<_, MyError>(42)
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::utils::sleep_or_cancel;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Trait for failures that can be classified as rate limiting
///
/// Rate-limited failures never spend retry budget.
pub trait IsRateLimited {
    /// Returns true if the upstream asked the caller to slow down
    fn is_rate_limited(&self) -> bool;
}

/// Why [`retry_with_budget`] gave up
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Every unit of budget was spent on failures
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        /// Budget-consuming attempts made
        attempts: u32,
        /// The failure of the final attempt
        last: E,
    },
    /// The cancellation token fired
    #[error("cancelled")]
    Cancelled,
}

/// Backoff notification passed to the observer before each wait
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetryNotice {
    /// Waiting after a rate-limit signal; budget untouched
    RateLimited {
        /// Wait before the next attempt
        delay: Duration,
    },
    /// Waiting after a budget-consuming failure
    Retrying {
        /// Budget-consuming attempts so far
        attempt: u32,
        /// Budget left
        remaining: u32,
        /// Wait before the next attempt
        delay: Duration,
        /// Failure description
        error: String,
    },
}

/// Execute an async operation under a retry budget
///
/// # Arguments
///
/// * `config` - Budget and the two backoff delays
/// * `cancel` - Checked before every attempt and raced against every request and sleep
/// * `notify` - Called with a [`RetryNotice`] before each backoff sleep
/// * `operation` - Async closure producing one attempt
///
/// # Returns
///
/// The first successful value, [`RetryError::Exhausted`] once `max_attempts` failures
/// have been observed (the next attempt is never made), or [`RetryError::Cancelled`].
pub async fn retry_with_budget<F, Fut, T, E, N>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut notify: N,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRateLimited + std::fmt::Display,
    N: FnMut(RetryNotice),
{
    let mut remaining = config.max_attempts;
    let mut attempts = 0u32;
    let mut rate_limited = 0u64;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            result = operation() => result,
        };

        match result {
            Ok(value) => {
                if attempts > 0 || rate_limited > 0 {
                    tracing::info!(
                        failed_attempts = attempts,
                        rate_limited,
                        "operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(e) if e.is_rate_limited() => {
                rate_limited += 1;
                let delay = config.rate_limit_delay;
                tracing::warn!(
                    error = %e,
                    rate_limited,
                    delay_ms = delay.as_millis() as u64,
                    "rate limited, backing off without spending retry budget"
                );
                notify(RetryNotice::RateLimited { delay });
                if sleep_or_cancel(cancel, delay).await.is_err() {
                    return Err(RetryError::Cancelled);
                }
            }
            Err(e) => {
                attempts += 1;
                remaining = remaining.saturating_sub(1);

                if remaining == 0 {
                    tracing::error!(
                        error = %e,
                        attempts,
                        "operation failed after all retry attempts exhausted"
                    );
                    return Err(RetryError::Exhausted { attempts, last: e });
                }

                let delay = config.retry_delay;
                tracing::warn!(
                    error = %e,
                    attempt = attempts,
                    remaining,
                    delay_ms = delay.as_millis() as u64,
                    "operation failed, retrying"
                );
                notify(RetryNotice::Retrying {
                    attempt: attempts,
                    remaining,
                    delay,
                    error: e.to_string(),
                });
                if sleep_or_cancel(cancel, delay).await.is_err() {
                    return Err(RetryError::Cancelled);
                }
            }
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, thiserror::Error)]
    enum TestError {
        #[error("HTTP 429")]
        RateLimited,
        #[error("HTTP 500")]
        Broken,
    }

    impl IsRateLimited for TestError {
        fn is_rate_limited(&self) -> bool {
            matches!(self, TestError::RateLimited)
        }
    }

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            retry_delay: Duration::from_millis(1),
            rate_limit_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_retry_error_messages() {
        let exhausted: RetryError<TestError> = RetryError::Exhausted {
            attempts: 10,
            last: TestError::Broken,
        };
        assert_eq!(exhausted.to_string(), "gave up after 10 attempts: HTTP 500");
        assert_eq!(RetryError::<TestError>::Cancelled.to_string(), "cancelled");

        let boxed: Box<dyn std::error::Error> = Box::new(exhausted);
        assert!(boxed.source().is_none());
    }

    #[tokio::test]
    async fn test_success_no_retry() {
        let config = fast_config(10);
        let cancel = CancellationToken::new();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_budget(&config, &cancel, |_| {}, || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TestError>(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1, "should only call once");
    }

    #[tokio::test]
    async fn test_budget_exhausted_after_exactly_max_attempts() {
        let config = fast_config(10);
        let cancel = CancellationToken::new();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let mut notices = Vec::new();

        let result = retry_with_budget(&config, &cancel, |n| notices.push(n), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(TestError::Broken)
            }
        })
        .await;

        match result {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 10);
                assert_eq!(last.to_string(), "HTTP 500");
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(
            counter.load(Ordering::SeqCst),
            10,
            "the 11th attempt must never be made"
        );
        // No backoff after the final failure
        assert_eq!(notices.len(), 9);
        assert_eq!(
            notices.last(),
            Some(&RetryNotice::Retrying {
                attempt: 9,
                remaining: 1,
                delay: Duration::from_millis(1),
                error: "HTTP 500".into(),
            })
        );
    }

    #[tokio::test]
    async fn test_rate_limit_never_spends_budget() {
        // Budget of 1: a single genuine failure would end the run
        let config = fast_config(1);
        let cancel = CancellationToken::new();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let mut rate_limit_notices = 0;

        let result = retry_with_budget(
            &config,
            &cancel,
            |n| {
                if matches!(n, RetryNotice::RateLimited { .. }) {
                    rate_limit_notices += 1;
                }
            },
            || {
                let counter = counter_clone.clone();
                async move {
                    let count = counter.fetch_add(1, Ordering::SeqCst);
                    if count < 50 {
                        Err(TestError::RateLimited)
                    } else {
                        Ok("payload")
                    }
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), "payload");
        assert_eq!(counter.load(Ordering::SeqCst), 51);
        assert_eq!(rate_limit_notices, 50);
    }

    #[tokio::test]
    async fn test_rate_limits_interleaved_with_failures() {
        let config = fast_config(3);
        let cancel = CancellationToken::new();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        // 429, 500, 429, 500, 429, 500 -> third genuine failure exhausts the budget
        let result = retry_with_budget(&config, &cancel, |_| {}, || {
            let counter = counter_clone.clone();
            async move {
                let count = counter.fetch_add(1, Ordering::SeqCst);
                if count % 2 == 0 {
                    Err::<(), _>(TestError::RateLimited)
                } else {
                    Err(TestError::Broken)
                }
            }
        })
        .await;

        assert!(matches!(
            result,
            Err(RetryError::Exhausted { attempts: 3, .. })
        ));
        assert_eq!(counter.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_retry_transient_then_succeed() {
        let config = fast_config(10);
        let cancel = CancellationToken::new();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_budget(&config, &cancel, |_| {}, || {
            let counter = counter_clone.clone();
            async move {
                let count = counter.fetch_add(1, Ordering::SeqCst);
                if count < 2 {
                    Err(TestError::Broken)
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_delay_is_applied() {
        let config = RetryConfig {
            max_attempts: 3,
            retry_delay: Duration::from_millis(30),
            rate_limit_delay: Duration::from_millis(1),
        };
        let cancel = CancellationToken::new();
        let start = std::time::Instant::now();

        let _ = retry_with_budget(&config, &cancel, |_| {}, || async {
            Err::<(), _>(TestError::Broken)
        })
        .await;

        // Two sleeps between three attempts
        assert!(
            start.elapsed() >= Duration::from_millis(60),
            "waited {:?}",
            start.elapsed()
        );
    }

    #[tokio::test]
    async fn test_cancel_interrupts_rate_limit_backoff() {
        let config = RetryConfig {
            max_attempts: 10,
            retry_delay: Duration::from_secs(2),
            rate_limit_delay: Duration::from_secs(60),
        };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let start = std::time::Instant::now();
        let result = retry_with_budget(&config, &cancel, |_| {}, || async {
            Err::<(), _>(TestError::RateLimited)
        })
        .await;

        assert!(matches!(result, Err(RetryError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let config = fast_config(10);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_budget(&config, &cancel, |_| {}, || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TestError>(())
            }
        })
        .await;

        assert!(matches!(result, Err(RetryError::Cancelled)));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
