//! Exponential backoff for transient upstream failures.

use std::future::Future;
use std::time::Duration;

use metrics::counter;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{ProviderError, ProviderResult};

/// Retry schedule: `max_retries` extra attempts, waiting `base * 2^k`
/// before retry `k` (1-based). The first attempt is immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry))
    }

    /// Run `operation` until it succeeds, fails permanently, or retries
    /// run out. Only [`ProviderError::is_retryable`] errors are retried.
    pub async fn run<T, F, Fut>(
        &self,
        provider: &'static str,
        operation: &str,
        mut attempt_fn: F,
    ) -> ProviderResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let mut retry = 0;
        loop {
            match attempt_fn().await {
                Ok(value) => {
                    counter!("infergate_upstream_attempts_total", "provider" => provider, "outcome" => "ok")
                        .increment(1);
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && retry < self.max_retries => {
                    counter!("infergate_upstream_attempts_total", "provider" => provider, "outcome" => err.kind())
                        .increment(1);
                    retry += 1;
                    let delay = self.delay_for(retry);
                    warn!(
                        provider,
                        operation,
                        retry,
                        ?delay,
                        error = %err,
                        "Upstream call failed, retrying"
                    );
                    sleep(delay).await;
                }
                Err(err) => {
                    counter!("infergate_upstream_attempts_total", "provider" => provider, "outcome" => err.kind())
                        .increment(1);
                    debug!(provider, operation, attempts = retry + 1, error = %err, "Giving up");
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn server_error() -> ProviderError {
        ProviderError::Status {
            status: 503,
            url: "http://upstream".into(),
            message: "busy".into(),
        }
    }

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_exhausted() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        let attempts = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result: ProviderResult<()> = policy
            .run("test", "op", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(server_error())
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert!(started.elapsed() >= Duration::from_secs(14));
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_not_retried() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        let attempts = AtomicU32::new(0);

        let result: ProviderResult<()> = policy
            .run("test", "op", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::Status {
                    status: 400,
                    url: String::new(),
                    message: "bad".into(),
                })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failure() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        let attempts = AtomicU32::new(0);

        let result = policy
            .run("test", "op", || async {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ProviderError::Network("reset".into()))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
