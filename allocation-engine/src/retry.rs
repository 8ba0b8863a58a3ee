//! Bounded exponential backoff for transient backend failures (§7
//! `DbOperationError`: "retried with bounded backoff by the Allocation
//! Engine; surfaced after budget"). Grounded on
//! `nats_coordination::lease::RetryPolicy`'s shape.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use lease_store::LeaseStoreError;

/// Default maximum retry attempts for a transient backend failure.
const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(10),
        }
    }
}

/// Runs `op` up to `policy.max_retries` additional times when it fails with
/// `DbOperationError`; any other error, or final exhaustion, is returned
/// immediately.
pub(crate) async fn retry_db<F, Fut, T>(policy: &RetryPolicy, mut op: F) -> Result<T, LeaseStoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LeaseStoreError>>,
{
    let mut attempts = 0u32;
    loop {
        match op().await {
            Err(err) if err.is_retryable() => {
                attempts += 1;
                if attempts > policy.max_retries {
                    return Err(err);
                }
                warn!(attempts, %err, "transient lease store error, retrying");
                tokio::time::sleep(policy.base_delay * 2u32.saturating_pow(attempts - 1)).await;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> LeaseStoreError {
        LeaseStoreError::DbOperationError(sqlx::Error::PoolClosed)
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures_within_budget() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
        };
        let result: Result<u32, LeaseStoreError> = retry_db(&policy, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(transient())
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn surfaces_error_after_budget_exhausted() {
        let policy = RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(1),
        };
        let result: Result<u32, LeaseStoreError> = retry_db(&policy, || async { Err(transient()) }).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn non_transient_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();
        let result: Result<u32, LeaseStoreError> = retry_db(&policy, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(LeaseStoreError::NoSuchLease)
        })
        .await;
        assert!(matches!(result, Err(LeaseStoreError::NoSuchLease)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
