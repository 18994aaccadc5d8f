//! Exponential backoff for bulk batches.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

/// Retry schedule.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Delay growth factor between attempts.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Schedule with `max_attempts` attempts and default delays.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }

    /// Set the initial delay.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }
}

/// Outcome of [`with_retry`].
#[derive(Debug)]
pub enum RetryResult<T, E> {
    /// Operation succeeded.
    Success(T),
    /// Operation failed permanently or ran out of attempts.
    Failed {
        /// Error from the last attempt.
        last_error: E,
        /// Attempts made.
        attempts: u32,
    },
}

/// Classifies errors as transient.
pub trait Retryable {
    /// Whether another attempt may succeed.
    fn is_retryable(&self) -> bool;
}

/// Run `operation` until it succeeds, fails permanently, or exhausts the schedule.
pub async fn with_retry<T, E, F, Fut>(config: &RetryConfig, mut operation: F) -> RetryResult<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempts = 0;
    let mut delay = config.initial_delay;

    loop {
        attempts += 1;

        match operation().await {
            Ok(value) => return RetryResult::Success(value),
            Err(error) => {
                if attempts >= config.max_attempts || !error.is_retryable() {
                    return RetryResult::Failed {
                        last_error: error,
                        attempts,
                    };
                }

                tracing::warn!(
                    attempt = attempts,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Transient failure; retrying"
                );
                sleep(delay).await;

                delay = Duration::from_secs_f64(delay.as_secs_f64() * config.multiplier)
                    .min(config.max_delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[derive(Debug)]
    struct Failure {
        transient: bool,
    }

    impl std::fmt::Display for Failure {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "failure (transient: {})", self.transient)
        }
    }

    impl Retryable for Failure {
        fn is_retryable(&self) -> bool {
            self.transient
        }
    }

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryConfig::new(max_attempts).with_initial_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast(3), || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Failure { transient: true })
            } else {
                Ok("done")
            }
        })
        .await;

        assert!(matches!(result, RetryResult::Success("done")));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_on_permanent_failure() {
        let calls = AtomicU32::new(0);
        let result: RetryResult<(), _> = with_retry(&fast(5), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Failure { transient: false })
        })
        .await;

        assert!(matches!(result, RetryResult::Failed { attempts: 1, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let result: RetryResult<(), _> =
            with_retry(&fast(3), || async { Err(Failure { transient: true }) }).await;
        assert!(matches!(result, RetryResult::Failed { attempts: 3, .. }));
    }
}
