//! Bounded exponential backoff for repository requests.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};

/// Retry policy applied to every HTTP call made by the clients.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 disables retrying).
    pub max_retries: u32,
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_secs: 1,
            max_delay_secs: 60,
        }
    }
}

impl RetryPolicy {
    /// Policy with the default 60 second delay cap.
    #[must_use]
    pub fn new(max_retries: u32, base_delay_secs: u64) -> Self {
        Self {
            max_retries,
            base_delay_secs,
            ..Self::default()
        }
    }

    /// Policy that never retries. Used by tests that count requests.
    #[must_use]
    pub fn none() -> Self {
        Self::new(0, 0)
    }

    /// Whether `error` seen on `attempt` (zero based) should be retried.
    #[must_use]
    pub fn should_retry(&self, attempt: u32, error: &ClientError) -> bool {
        attempt < self.max_retries && (error.is_retryable() || error.is_server_error())
    }

    /// Delay before the next attempt.
    ///
    /// A 429 carrying `Retry-After` waits that long; everything else waits
    /// `base * 2^attempt`. Both are capped at `max_delay_secs`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, error: &ClientError) -> Duration {
        let secs = match error {
            ClientError::RateLimited {
                retry_after_secs: Some(retry_after),
            } => *retry_after,
            _ => self
                .base_delay_secs
                .saturating_mul(2u64.saturating_pow(attempt)),
        };
        Duration::from_secs(secs.min(self.max_delay_secs))
    }

    /// Run `f` until it succeeds, fails permanently, or retries run out.
    pub async fn execute<F, Fut, T>(&self, operation: &str, mut f: F) -> ClientResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let error = match f().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(operation, attempts = attempt + 1, "Request succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !self.should_retry(attempt, &error) {
                let transient = error.is_retryable() || error.is_server_error();
                if !transient || self.max_retries == 0 {
                    return Err(error);
                }
                warn!(operation, attempts = attempt + 1, error = %error, "Giving up after retries");
                return Err(ClientError::MaxRetriesExceeded {
                    attempts: attempt + 1,
                    message: format!("{operation}: {error}"),
                });
            }

            let delay = self.delay_for(attempt, &error);
            debug!(
                operation,
                attempt = attempt + 1,
                max_retries = self.max_retries,
                delay_secs = delay.as_secs(),
                error = %error,
                "Retrying after transient error"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
