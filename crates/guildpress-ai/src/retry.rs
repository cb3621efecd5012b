use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::AiError;

/// Backoff delays are capped here regardless of multiplier growth.
const MAX_BACKOFF_MS: u64 = 30_000;
/// Jitter fraction applied on top of each delay (0..10%).
const JITTER_FRACTION: u64 = 10;

/// Retry schedule for LLM calls: `max_attempts` total tries,
/// exponential delay `base * multiplier^(attempt-1)` plus jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Deterministic part of the delay after the given 1-based attempt.
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let exp = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let delay = (self.base_delay_ms as f64 * exp) as u64;
        delay.min(MAX_BACKOFF_MS)
    }

    /// Full sleep for the given attempt, jitter included.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.backoff_ms(attempt);
        Duration::from_millis(base + jitter_ms(base))
    }
}

/// Uniform jitter in `[0, base/10]`, derived from the monotonic clock's
/// sub-second noise. Avoids a rand dependency.
fn jitter_ms(base_ms: u64) -> u64 {
    let max_jitter = base_ms / JITTER_FRACTION;
    if max_jitter == 0 {
        return 0;
    }
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    u64::from(nanos) % (max_jitter + 1)
}

/// Drive `op` until it succeeds, fails with a non-retryable error, or
/// the attempt budget is spent. Only 429/500/503 and connection-level
/// failures are retried; the final attempt's error propagates as-is.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, AiError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AiError>>,
{
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < attempts => {
                let delay = policy.delay(attempt);
                warn!(
                    attempt,
                    max = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "LLM call failed, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }

    // The loop always returns inside the match arms above.
    unreachable!("retry loop exited without returning")
}
