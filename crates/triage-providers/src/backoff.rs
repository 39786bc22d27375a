//! Exponential-backoff retry helper shared by the embedding client and the
//! LLM client (§4.1, §4.4: "retry with backoff ... doubling delay").

use std::time::Duration;

use tracing::warn;

use crate::error::ProviderError;

/// Retry `op` up to `max_attempts` times with a doubling delay, starting at
/// `initial_delay`. Returns `ProviderError::Unavailable` once attempts are
/// exhausted or `op` returns a non-retryable error.
pub async fn retry_with_backoff<T, F, Fut>(
    dependency: &'static str,
    max_attempts: u32,
    initial_delay: Duration,
    mut op: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ProviderError>>,
{
    let mut delay = initial_delay;
    let mut last_err = None;

    for attempt in 1..=max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                warn!(dependency, attempt, delay_ms = delay.as_millis() as u64, error = %err, "transient provider error, retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
                last_err = Some(err);
            }
            Err(err) => {
                let reason = err.to_string();
                last_err = Some(err);
                return Err(ProviderError::Unavailable { attempts: attempt, reason });
            }
        }
    }

    Err(ProviderError::Unavailable {
        attempts: max_attempts,
        reason: last_err.map(|e| e.to_string()).unwrap_or_else(|| "exhausted retries".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff("test", 5, Duration::from_millis(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ProviderError::Timeout(Duration::from_millis(1)))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_into_unavailable() {
        let result: Result<(), _> = retry_with_backoff("test", 3, Duration::from_millis(1), || async {
            Err(ProviderError::Timeout(Duration::from_millis(1)))
        })
        .await;
        match result {
            Err(ProviderError::Unavailable { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_retryable_fails_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff("test", 5, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::Api { status: 400, message: "bad request".into() }) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
