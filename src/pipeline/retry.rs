use std::{future::Future, time::Duration};

use rand::Rng;
use tracing::warn;

use crate::config::RetryConfig;

/// Errors that know whether another attempt might succeed.
pub trait Retryable {
    fn should_retry(&self) -> bool;

    /// Server-provided minimum wait, e.g. from `Retry-After`.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// `base * 2^attempt` with ±30% jitter; the exponent stops growing at 10.
fn jittered_backoff(attempt: u32, base: Duration) -> Duration {
    let doubled = base.saturating_mul(1_u32 << attempt.min(10));
    let jitter = rand::thread_rng().gen_range(0.7..1.3);
    Duration::try_from_secs_f64(doubled.as_secs_f64() * jitter).unwrap_or(Duration::MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay,
            ..Self::default()
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Wait before attempt `attempt + 1`, honoring a server hint.
    pub fn delay_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let backoff = jittered_backoff(attempt, self.base_delay);
        hint.map_or(backoff, |h| h.max(backoff)).min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<T, E, F, Fut>(&self, op_name: &str, mut op: F) -> Result<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.should_retry() && attempt + 1 < self.max_attempts => {
                    let delay = self.delay_for(attempt, err.retry_after());
                    warn!(
                        op = op_name,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
