//! Retry with exponential backoff for recoverable errors
//!
//! Facet fetches are not retried unless the caller opts in through
//! `AggregatorConfig::retry`.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;

use crate::error::{Result, ServiceError};
use crate::util::sanitize_for_logging;

/// Backoff schedule for a facet fetch
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt; 0 disables retrying
    pub max_retries: u32,

    pub initial_interval: Duration,

    /// Cap on a single backoff interval
    pub max_interval: Duration,

    pub multiplier: f64,

    /// Jitter as a fraction of each interval
    pub randomization_factor: f64,

    /// Give up once this much time has passed since the first attempt
    pub max_elapsed_time: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(10),
            multiplier: 2.0,
            randomization_factor: 0.2,
            max_elapsed_time: Some(Duration::from_secs(30)),
        }
    }
}

impl RetryConfig {
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.initial_interval,
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            multiplier: self.multiplier,
            randomization_factor: self.randomization_factor,
            max_elapsed_time: self.max_elapsed_time,
            ..ExponentialBackoff::default()
        }
    }
}

/// Re-runs an operation while it fails with a retryable `ServiceError`
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation` until it succeeds, fails permanently, or the retry
    /// budget is spent
    ///
    /// The returned error carries the number of retries made under the
    /// `attempts` context key.
    pub async fn execute<F, Fut, T>(&self, label: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut backoff = self.config.backoff();
        let mut retries = 0;

        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_retryable() || retries >= self.config.max_retries {
                return Err(Self::annotate(err, retries));
            }

            let Some(delay) = backoff.next_backoff() else {
                log::warn!("{} still failing after {:?}, giving up", label, self.config.max_elapsed_time);
                return Err(Self::annotate(err, retries));
            };

            retries += 1;
            log::warn!(
                "{} failed ({}), retry {}/{} in {:?}",
                label,
                sanitize_for_logging(&err.to_string()),
                retries,
                self.config.max_retries,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn annotate(err: ServiceError, retries: u32) -> ServiceError {
        if retries == 0 {
            err
        } else {
            err.with_context_value("attempts", retries)
        }
    }
}
