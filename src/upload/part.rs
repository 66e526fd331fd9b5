use crate::api::Backend;
use crate::error::{Error, Result};
use crate::upload::segment::Part;
use bytes::Bytes;
use log::{debug, warn};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(1000);
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(300);

/// Per-part retry budget with linear backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    pub backoff_base: Duration,
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
            attempt_timeout: Some(DEFAULT_ATTEMPT_TIMEOUT),
        }
    }
}

impl RetryPolicy {
    /// Delay after the 1-based attempt `failed_attempt` failed.
    #[must_use]
    pub fn backoff(&self, failed_attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(failed_attempt)
    }
}

async fn attempt<B: Backend + ?Sized>(
    backend: &B,
    url: &str,
    data: Bytes,
    timeout: Option<Duration>,
) -> Result<()> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, backend.put_part(url, data))
            .await
            .map_err(|_| Error::Timeout(limit))?,
        None => backend.put_part(url, data).await,
    }
}

/// Uploads one part, retrying failed attempts under `policy`.
///
/// `on_success` runs exactly once, after the first successful attempt.
/// Cancellation is honored before each attempt, while an attempt is in flight
/// and during backoff.
///
/// # Errors
///
/// Returns [`Error::PartUploadError`] once the retry budget is exhausted, or
/// [`Error::Cancelled`] if `cancel` fires first.
pub async fn upload_part<B, F>(
    backend: &B,
    part: &Part,
    data: Bytes,
    url: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    on_success: F,
) -> Result<()>
where
    B: Backend + ?Sized,
    F: FnOnce(),
{
    let attempts = policy.attempts.max(1);
    let mut attempt_number = 0;

    loop {
        attempt_number += 1;

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        debug!(
            "Uploading part {} ({} bytes), attempt {attempt_number}/{attempts}",
            part.index,
            data.len()
        );

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            result = attempt(backend, url, data.clone(), policy.attempt_timeout) => result,
        };

        match result {
            Ok(()) => {
                debug!("Part {} uploaded successfully", part.index);
                on_success();
                return Ok(());
            }
            Err(e) if attempt_number >= attempts => {
                warn!(
                    "Part {} failed after {attempt_number} attempt(s): {e}",
                    part.index
                );
                return Err(Error::PartUploadError {
                    part_index: part.index,
                    attempts: attempt_number,
                    cause: Box::new(e),
                });
            }
            Err(e) => {
                let delay = policy.backoff(attempt_number);
                warn!(
                    "Part {} attempt {attempt_number}/{attempts} failed: {e}; retrying in {delay:?}",
                    part.index
                );
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(Error::Cancelled),
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}
