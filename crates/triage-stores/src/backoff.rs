//! Local retry/backoff for store adapters (§7: "C1, C2, C3, C4 own
//! retry/backoff locally for transient errors"). Same shape as the one in
//! `triage-providers`; kept crate-local rather than shared, matching the
//! teacher's pattern of small per-crate helpers over a shared utility crate.

use std::time::Duration;

use tracing::warn;

use crate::error::StoreError;

pub async fn retry_with_backoff<T, F, Fut>(dependency: &'static str, max_attempts: u32, initial_delay: Duration, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, StoreError>>,
{
    let mut delay = initial_delay;
    let mut last_err = None;

    for attempt in 1..=max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                warn!(dependency, attempt, error = %err, "transient store error, retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
                last_err = Some(err);
            }
            Err(err) => return Err(StoreError::Unavailable(err.to_string())),
        }
    }

    Err(StoreError::Unavailable(last_err.map(|e| e.to_string()).unwrap_or_else(|| "exhausted retries".to_string())))
}
