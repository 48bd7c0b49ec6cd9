//! Resilience policy for facet fetches
//!
//! - Retry with exponential backoff (opt-in)
//! - Per-fetch deadline (opt-in)
//! - `FetchPolicy`, the facade the aggregator wraps every fetch in

mod retry;

pub use retry::{RetryExecutor, RetryConfig};

use std::future::Future;
use std::time::Duration;

use crate::config::AggregatorConfig;
use crate::error::{Result, ServiceError};

/// Composes the optional deadline and retry policy around a fetch
#[derive(Debug, Clone, Default)]
pub struct FetchPolicy {
    retry: Option<RetryExecutor>,
    timeout: Option<Duration>,
}

impl FetchPolicy {
    pub fn new(retry: Option<RetryConfig>, timeout: Option<Duration>) -> Self {
        Self {
            retry: retry.map(RetryExecutor::new),
            timeout,
        }
    }

    pub fn from_config(config: &AggregatorConfig) -> Self {
        Self::new(config.retry.clone(), config.facet_timeout)
    }

    /// Single attempt, no deadline
    pub fn passthrough() -> Self {
        Self::default()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn retry_config(&self) -> Option<&RetryConfig> {
        self.retry.as_ref().map(RetryExecutor::config)
    }

    /// Run `operation` under this policy
    ///
    /// The deadline bounds the whole call, retries and backoff included.
    /// Expiry surfaces as `ServiceError::Timeout`.
    pub async fn execute<F, Fut, T>(&self, label: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempt = async {
            match self.retry {
                Some(ref retry) => retry.execute(label, &operation).await,
                None => operation().await,
            }
        };

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, attempt)
                .await
                .map_err(|_| ServiceError::timeout(format!("{} did not complete within {:?}", label, limit)))?,
            None => attempt.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_passthrough_runs_once() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let policy = FetchPolicy::passthrough();

        let result: Result<()> = policy.execute("manager", || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(ServiceError::network("connection reset"))
        }).await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deadline_expires() {
        let policy = FetchPolicy::new(None, Some(Duration::from_millis(50)));

        let result = policy.execute("photo", || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }).await;

        let err = result.unwrap_err();
        assert!(matches!(err, ServiceError::Timeout(ref m) if m.contains("photo")));
    }

    #[test]
    fn test_from_config() {
        let config = AggregatorConfig::default()
            .with_facet_timeout(Duration::from_secs(3))
            .with_retry(RetryConfig { max_retries: 1, ..RetryConfig::default() });

        let policy = FetchPolicy::from_config(&config);
        assert_eq!(policy.timeout(), Some(Duration::from_secs(3)));
        assert_eq!(policy.retry_config().map(|r| r.max_retries), Some(1));
    }
}
