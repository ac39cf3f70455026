use crate::config::RetryConfig;
use crate::error::SourceError;
use log::{debug, warn};
use std::future::Future;
use std::time::Duration;

/// Exponential backoff policy for upstream requests
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_secs(config.max_delay_seconds),
            request_timeout: Duration::from_secs(config.request_timeout_seconds),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (zero-based)
    ///
    /// A server hint takes precedence over the computed backoff. Either way the
    /// result never exceeds `max_delay`.
    pub fn next_delay(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let delay = hint.unwrap_or_else(|| {
            let factor = 2u32.saturating_pow(attempt);
            self.base_delay.saturating_mul(factor)
        });
        delay.min(self.max_delay)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the policy's attempts are exhausted
///
/// # Arguments
/// * `policy` - Attempt count and backoff bounds
/// * `label` - Source id used in log lines
/// * `operation` - Produces a fresh request future per attempt
///
/// # Returns
/// The first success, or the last error seen
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < policy.max_attempts => {
                let delay = policy.next_delay(attempt, err.retry_after());
                warn!(
                    "{}: attempt {}/{} failed ({}), retrying in {:?}",
                    label,
                    attempt + 1,
                    policy.max_attempts,
                    err,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                debug!("{}: giving up after {} attempt(s): {}", label, attempt + 1, err);
                return Err(err);
            }
        }
    }
}
