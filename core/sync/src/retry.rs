//! Backoff for retryable bulk source downloads.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use twinsync_common::Result;

/// How many times, and how patiently, a retryable fetch failure is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRetry {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl FetchRetry {
    /// Delay before retry `retry` (1-based).
    ///
    /// Doubles from `initial_delay` up to `max_delay`, then spreads by up to
    /// a quarter either way so restarted instances do not fetch in lockstep.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32
            .checked_shl(retry.saturating_sub(1))
            .unwrap_or(u32::MAX);
        let capped = self.initial_delay.saturating_mul(factor).min(self.max_delay);
        capped.mul_f64(0.75 + rand::random::<f64>() * 0.5)
    }

    /// Run `fetch` until it succeeds, fails for good, or retries run out.
    ///
    /// Only errors for which [`twinsync_common::Error::is_retryable`] holds
    /// are retried. The last error is returned unchanged.
    pub async fn run<F, Fut, T>(&self, fetch: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retry = 0;
        loop {
            let err = match fetch().await {
                Ok(value) => {
                    if retry > 0 {
                        debug!(retries = retry, "Fetch succeeded after retrying");
                    }
                    return Ok(value);
                }
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => err,
            };

            if retry == self.max_retries {
                warn!(attempts = retry + 1, "Fetch still failing, giving up: {}", err);
                return Err(err);
            }
            retry += 1;

            let delay = self.backoff(retry);
            warn!(retry, "Fetch failed: {}. Retrying in {:?}", err, delay);
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for FetchRetry {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}
