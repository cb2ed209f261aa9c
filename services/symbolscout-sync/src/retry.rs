//! Bounded retry with exponential backoff for feed requests

use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::settings::HttpSettings;

/// Retry configuration for feed and list fetches
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&HttpSettings::default())
    }
}

impl From<&HttpSettings> for RetryConfig {
    fn from(http: &HttpSettings) -> Self {
        Self {
            max_attempts: http.max_attempts.max(1),
            base_delay_ms: http.base_delay_ms,
            max_delay_ms: http.max_delay_ms,
            jitter: true,
        }
    }
}

/// Delay before retry number `attempt + 1`: base * 2^attempt, capped, ±25% jitter
pub fn backoff_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let delay = config.base_delay_ms.saturating_mul(1_u64 << attempt.min(16));
    let delay = delay.min(config.max_delay_ms);

    let jittered = if config.jitter && delay > 0 {
        let jitter_range = delay / 4;
        let jitter = rand::random::<u64>() % (jitter_range * 2 + 1);
        delay.saturating_sub(jitter_range) + jitter
    } else {
        delay
    };

    Duration::from_millis(jittered)
}

/// Run `operation` until it succeeds, fails permanently, or attempts run out
pub async fn with_retry<F, Fut, T>(operation: F, config: &RetryConfig) -> Result<T, FetchError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, FetchError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                warn!(
                    "Request failed (attempt {}/{}): {}",
                    attempt + 1,
                    max_attempts,
                    e
                );
                let delay = backoff_delay(attempt, config);
                debug!("Retrying after {:?}", delay);
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
