//! Bounded exponential backoff for transport calls.

use std::future::Future;
use std::time::Duration;

use muld_manifest::RetryPolicy;
use muld_transport::TransportResult;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{SyncError, SyncResult};

/// Delay before retry number `retry` (1-based), jitter included.
pub fn backoff_delay(policy: &RetryPolicy, retry: u32) -> Duration {
    let base = policy.base_delay(retry);
    if !policy.jitter || base.is_zero() {
        return base;
    }
    let spread = u64::try_from(base.as_millis() / 4).unwrap_or(u64::MAX);
    let extra = rand::thread_rng().gen_range(0..=spread);
    base + Duration::from_millis(extra)
}

/// Run `op` until it succeeds, fails permanently or the attempts run out.
///
/// Only transient transport errors are retried. Cancellation is honoured
/// while waiting between attempts, never in the middle of one.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    operation: &str,
    mut op: F,
) -> SyncResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = TransportResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = backoff_delay(policy, attempt);
                warn!(operation, attempt, max_attempts, delay_ms = delay.as_millis() as u64, error = %e, "transient failure, retrying");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}
