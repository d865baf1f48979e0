//! Bounded retry with exponential backoff for background tasks

use std::time::Duration;

use tracing::{error, warn};

use crate::error::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): base * 2^(retry-1), capped
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Run a blocking database operation on the blocking pool, retrying
/// transient failures with backoff. Non-transient errors return at once.
pub async fn retry_blocking<T, F>(
    policy: &RetryPolicy,
    task: &str,
    op: F,
) -> Result<T, StorageError>
where
    F: Fn() -> Result<T, StorageError> + Send + Sync + Clone + 'static,
    T: Send + 'static,
{
    let mut retry = 0;

    loop {
        let attempt = op.clone();
        let result = tokio::task::spawn_blocking(attempt)
            .await
            .map_err(|e| StorageError::Internal(format!("Task join error: {}", e)))?;

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && retry < policy.max_retries => {
                retry += 1;
                let delay = policy.delay_for(retry);
                warn!(
                    task = task,
                    retry = retry,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Background task failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                error!(task = task, retries = retry, error = %e, "Background task failed");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(20), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = retry_blocking(&fast_policy(5), "test", move || {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(StorageError::Pool("busy".into()))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), _> = retry_blocking(&fast_policy(2), "test", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::Pool("busy".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), _> = retry_blocking(&fast_policy(5), "test", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::NotFound("post".into()))
        })
        .await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
