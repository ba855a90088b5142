//! Retry logic with exponential backoff for the seed and token exchanges.
//!
//! Retries only on transient transport errors (connection failures,
//! timeouts, 5xx answers). Authority status codes are protocol outcomes
//! and are never retried here. Uploads never go through this path.

use std::time::Duration;

use crate::config::SiiConfig;
use crate::error::TransportError;

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles each retry.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// A single attempt.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Policy from the configured retry count and base delay.
    pub fn from_config(config: &SiiConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }

    /// Delay before retry number `attempt` (zero-based).
    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Run `f` until it succeeds, fails permanently, or the retries run out.
///
/// Delays with the default policy: 200ms → 400ms → 800ms between retries.
pub(crate) fn retry_transport<T, F>(policy: RetryPolicy, mut f: F) -> Result<T, TransportError>
where
    F: FnMut() -> Result<T, TransportError>,
{
    for attempt in 0..policy.max_retries {
        match f() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                let delay = policy.delay(attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    endpoint = e.endpoint().unwrap_or("unknown"),
                    "authority request failed, retrying in {delay:?}: {e}"
                );
                std::thread::sleep(delay);
            }
            Err(e) => return Err(e),
        }
    }
    // Final attempt, no more retries.
    f()
}
