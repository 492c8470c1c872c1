//! Timeout and retry wrapper for store calls.
//!
//! Every call is bounded by [`PersistConfig::timeout`]. A call that times
//! out or fails with a transient store error is repeated up to
//! [`PersistConfig::retries`] more times after [`PersistConfig::backoff`].

use std::future::Future;

use zoning_map_database::DbError;

use crate::{PersistConfig, PersistError};

/// Runs `call` under the limits in `config`.
///
/// `call` is invoked once per attempt so each attempt gets a fresh
/// future.
///
/// # Errors
///
/// Returns the last [`PersistError`] once the call fails permanently or
/// the retries are used up.
pub async fn with_retry<T, F, Fut>(
    config: &PersistConfig,
    operation: &'static str,
    mut call: F,
) -> Result<T, PersistError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbError>>,
{
    let mut attempt = 0;

    loop {
        let err = match tokio::time::timeout(config.timeout(), call()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => PersistError::Store(e),
            Err(_) => PersistError::Timeout {
                operation,
                timeout_ms: config.timeout_ms,
            },
        };

        if attempt >= config.retries || !err.is_retryable() {
            if attempt > 0 {
                log::error!("Store {operation} failed after {} attempts: {err}", attempt + 1);
            }
            return Err(err);
        }

        attempt += 1;
        log::warn!(
            "Store {operation} failed (retry {attempt}/{}), retrying in {:?}: {err}",
            config.retries,
            config.backoff()
        );
        tokio::time::sleep(config.backoff()).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;

    fn fast(retries: u32) -> PersistConfig {
        PersistConfig {
            timeout_ms: 50,
            retries,
            backoff_ms: 1,
        }
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let attempts = &AtomicU32::new(0);
        let value = with_retry(&fast(1), "test", move || async move {
            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(DbError::Unavailable {
                    message: "down".to_string(),
                })
            } else {
                Ok(5)
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 5);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn does_not_retry_permanent_failures() {
        let attempts = &AtomicU32::new(0);
        let err = with_retry(&fast(3), "test", move || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(DbError::Conversion {
                message: "bad row".to_string(),
            })
        })
        .await
        .unwrap_err();

        assert!(!err.is_retryable());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn times_out_slow_calls() {
        let attempts = &AtomicU32::new(0);
        let err = with_retry(&fast(1), "test", move || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();

        assert!(matches!(err, PersistError::Timeout { timeout_ms: 50, .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
