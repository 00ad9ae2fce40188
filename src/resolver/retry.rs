//! Retry schedule and timeout helpers for provider requests

use crate::errors::{ProviderError, ProviderResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

/// Delay before the next full pass over the provider list
///
/// Grows linearly: `completed_passes * step_ms`, so the first pass starts
/// immediately and the second waits one step.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use stamp_tx_engine::resolver::retry::pass_delay;
///
/// assert_eq!(pass_delay(0, 1000), Duration::ZERO);
/// assert_eq!(pass_delay(2, 1000), Duration::from_millis(2000));
/// ```
pub fn pass_delay(completed_passes: usize, step_ms: u64) -> Duration {
    Duration::from_millis(step_ms.saturating_mul(completed_passes as u64))
}

/// Bound a provider request by `timeout_seconds`, reporting expiry as a provider error
pub async fn execute_with_timeout<T, F>(
    timeout_seconds: u64,
    url: &str,
    operation: F,
) -> ProviderResult<T>
where
    F: Future<Output = ProviderResult<T>>,
{
    match timeout(Duration::from_secs(timeout_seconds), operation).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout {
            timeout_seconds,
            url: url.to_string(),
        }),
    }
}
