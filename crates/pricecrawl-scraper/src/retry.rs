//! Linear-backoff retry for vision calls.
//!
//! Only errors whose `is_retryable` is true are retried; auth and validation
//! failures return on the first attempt.

use std::future::Future;
use std::time::Duration;

use crate::error::VisionError;

/// Runs `operation` up to `max_attempts` times in total, sleeping
/// `backoff * attempt` after each retryable failure.
///
/// | Attempt | Sleep after failure |
/// |---------|---------------------|
/// | 1       | 1 × backoff         |
/// | 2       | 2 × backoff         |
/// | n (last) | none, error returned |
pub(crate) async fn retry_linear<T, F, Fut>(
    max_attempts: u32,
    backoff: Duration,
    mut operation: F,
) -> Result<T, VisionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, VisionError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retryable() || attempt >= max_attempts {
                    return Err(err);
                }
                let delay = backoff.saturating_mul(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "transient vision error, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
