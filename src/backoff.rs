//! Reusable exponential-backoff policy
//!
//! One policy drives every retry loop in the crate: the App Store Connect
//! request executor, the screenshot downloader, and the duplicate detector.
//! A policy is parameterized by max attempts, base delay, and a retryable
//! predicate; delays grow as `base * 2^attempt` (capped) plus up to 10%
//! random jitter.

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

/// Exponential-backoff retry policy.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Total attempts, including the first
    pub max_attempts: usize,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Cap on any single delay
    pub max_delay: Duration,
    /// Jitter fraction added on top of the exponential delay (0.0..=1.0)
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::requests()
    }
}

impl BackoffPolicy {
    /// Policy for App Store Connect API calls: 3 attempts, 1s base.
    pub fn requests() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: 0.1,
        }
    }

    /// Policy for signed-URL screenshot downloads: 3 attempts, 2s/4s delays.
    pub fn downloads() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(8),
            jitter: 0.0,
        }
    }

    /// Policy for duplicate-detection passes: 3 attempts, 2s/4s delays.
    pub fn duplicate_checks() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(8),
            jitter: 0.0,
        }
    }

    /// Override attempt count.
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Override base delay (tests use millisecond-scale delays).
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Delay before retrying after `attempt` failures (0-indexed): the
    /// exponential component, capped, plus jitter.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.min(16) as u32));
        let capped = exp.min(self.max_delay);
        if self.jitter <= 0.0 {
            return capped;
        }
        let jitter_ms = (capped.as_millis() as f64 * self.jitter * rand::random::<f64>()) as u64;
        capped + Duration::from_millis(jitter_ms)
    }

    /// Run `op` with retries gated on [`Error::is_retryable`].
    pub async fn retry<T, F, Fut>(&self, op_name: &str, op: F) -> Result<T>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.retry_if(op_name, Error::is_retryable, op).await
    }

    /// Run `op` with retries gated on a caller-supplied predicate.
    ///
    /// Non-retryable errors fail immediately. After exhaustion the last
    /// error is surfaced with the total attempt count recorded.
    pub async fn retry_if<T, P, F, Fut>(&self, op_name: &str, retryable: P, mut op: F) -> Result<T>
    where
        P: Fn(&Error) -> bool,
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                let delay = self.delay_for(attempt - 1);
                tracing::debug!(
                    op = op_name,
                    attempt = attempt + 1,
                    max_attempts = self.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after backoff"
                );
                tokio::time::sleep(delay).await;
            }

            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if retryable(&e) => {
                    tracing::warn!(op = op_name, attempt = attempt + 1, error = %e, "transient failure");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .map(|e| e.after_attempts(self.max_attempts))
            .unwrap_or_else(|| Error::Transport {
                status: None,
                message: format!("{}: max retries exceeded", op_name),
                attempts: self.max_attempts,
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy(attempts: usize) -> BackoffPolicy {
        BackoffPolicy::requests()
            .with_max_attempts(attempts)
            .with_base_delay(Duration::from_millis(1))
    }

    #[test]
    fn test_delays_double_and_cap() {
        let policy = BackoffPolicy {
            max_attempts: 4,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(8),
            jitter: 0.0,
        };
        assert_eq!(policy.delay_for(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for(1), Duration::from_secs(4));
        assert_eq!(policy.delay_for(2), Duration::from_secs(8));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
    }

    #[test]
    fn test_jitter_stays_within_fraction() {
        let policy = BackoffPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: 0.1,
        };
        for _ in 0..50 {
            let delay = policy.delay_for(0);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_millis(1100));
        }
    }

    #[tokio::test]
    async fn test_retry_exhaustion_counts_attempts() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = fast_policy(3)
            .retry("test_op", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(Error::Transport {
                        status: Some(503),
                        message: "unavailable".to_string(),
                        attempts: 1,
                    })
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(Error::Transport { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("unexpected result: {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = fast_policy(3)
            .retry("test_op", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(Error::Auth {
                        status: Some(401),
                        message: "bad token".to_string(),
                    })
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(Error::Auth { .. })));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicUsize::new(0);
        let result = fast_policy(3)
            .retry("test_op", |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(Error::Transport {
                            status: Some(500),
                            message: "flaky".to_string(),
                            attempts: 1,
                        })
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
