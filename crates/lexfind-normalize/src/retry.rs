use rand::Rng;
use std::future::Future;
use std::time::Duration;

use lexfind_core::config::RetrySettings;

use crate::error::NormalizeError;

/// Bounded retry with exponential backoff and proportional jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self { Self::from_settings(&RetrySettings::default()) }
}

impl RetryPolicy {
    pub fn from_settings(s: &RetrySettings) -> Self {
        Self {
            max_attempts: s.max_attempts.max(1),
            base_delay: Duration::from_millis(s.base_delay_ms),
            max_delay: Duration::from_millis(s.max_delay_ms),
            jitter: s.jitter.clamp(0.0, 1.0),
        }
    }

    pub fn single_attempt() -> Self { Self { max_attempts: 1, ..Self::default() } }

    /// Delay before retry number `retry` (1-based), before jitter.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 || delay.is_zero() { return delay; }
        let spread = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        delay.mul_f32((1.0 + spread).max(0.0))
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// `max_attempts` calls have been made. `op` receives the 1-based attempt.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, NormalizeError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, NormalizeError>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && e.is_retryable() => {
                    let delay = self.jittered(self.backoff(attempt));
                    tracing::debug!(attempt, ?delay, error = %e, "retrying normalization");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
