use std::future::Future;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Result, TransportError};
use crate::transport::Transport;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Calculate the delay before a retry attempt using exponential backoff.
///
/// The delay formula is: `base * 2^retry_count`
///
/// # Arguments
///
/// * `retry_count` - The current retry number (0-indexed: 0 = first retry)
/// * `base` - The base delay duration
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use provision_transport::retry_delay;
///
/// assert_eq!(retry_delay(0, Duration::from_millis(100)), Duration::from_millis(100));
/// assert_eq!(retry_delay(1, Duration::from_millis(100)), Duration::from_millis(200));
/// assert_eq!(retry_delay(2, Duration::from_millis(100)), Duration::from_millis(400));
/// ```
pub fn retry_delay(retry_count: u32, base: Duration) -> Duration {
    let multiplier = 2_u32.saturating_pow(retry_count);
    base.saturating_mul(multiplier)
}

/// How many times a single transfer is re-attempted and how long to wait
/// between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: Duration,
    attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: DEFAULT_RETRY_BACKOFF,
            attempt_timeout: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Abort any single attempt that runs longer than `timeout`. The
    /// abandoned attempt counts as a retryable failure.
    pub fn attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn get_max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn get_backoff(&self) -> Duration {
        self.backoff
    }

    pub fn get_attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout
    }

    /// Drive `attempt` until it succeeds or `max_retries + 1` attempts have
    /// failed. Errors that cannot improve on retry are returned immediately.
    pub async fn run<F, Fut>(&self, remote: &str, local: &Path, mut attempt: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut retries = 0;
        loop {
            let outcome = match self.attempt_timeout {
                Some(limit) => match tokio::time::timeout(limit, attempt()).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(TransportError::TimedOut(limit)),
                },
                None => attempt().await,
            };

            let error = match outcome {
                Ok(()) => {
                    if retries > 0 {
                        debug!(remote, retries, "transfer succeeded after retrying");
                    }
                    return Ok(());
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            if retries >= self.max_retries {
                return Err(TransportError::ProvisioningFailed {
                    remote: remote.to_string(),
                    local: local.to_path_buf(),
                    attempts: retries + 1,
                    last: Box::new(error),
                });
            }

            let delay = retry_delay(retries, self.backoff);
            warn!(
                remote,
                local = %local.display(),
                attempt = retries + 1,
                ?delay,
                error = %error,
                "transfer attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
            retries += 1;
        }
    }

    pub async fn download(
        &self,
        transport: &dyn Transport,
        source: &str,
        destination: &Path,
    ) -> Result<()> {
        self.run(source, destination, || {
            transport.download_from(source, destination)
        })
        .await
    }

    pub async fn upload(
        &self,
        transport: &dyn Transport,
        destination: &str,
        source: &Path,
        metadata: Option<&str>,
    ) -> Result<()> {
        self.run(destination, source, || {
            transport.upload_to(destination, source, metadata)
        })
        .await
    }
}
