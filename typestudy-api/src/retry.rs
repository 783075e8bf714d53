//! Read retry
//!
//! Reads of shared files are retried a fixed number of times with a fixed
//! pause between attempts. Writes are never retried.

use std::future::Future;
use std::time::Duration;

use crate::drive::DriveError;

/// Run `operation` up to `1 + retries` times while it fails transiently
///
/// Permanent failures ([`DriveError::is_transient`] false) are returned
/// immediately.
pub async fn retry_read<F, Fut, T>(
    operation_name: &str,
    retries: u32,
    backoff: Duration,
    mut operation: F,
) -> Result<T, DriveError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DriveError>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(operation = operation_name, attempt, "Read succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) if err.is_transient() && attempt <= retries => {
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "Read failed, will retry after backoff"
                );
                tokio::time::sleep(backoff).await;
            }
            Err(err) => {
                if attempt > 1 {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        error = %err,
                        "Read failed: retries exhausted"
                    );
                }
                return Err(err);
            }
        }
    }
}
