use crate::error::{SteerError, SteerResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Backoff strategies for retry delays
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayStrategy {
    /// Fixed delay between retries
    Fixed,
    /// Linear backoff: delay = base_delay * attempt
    #[default]
    Linear,
    /// Exponential backoff: delay = base_delay * 2^(attempt-1)
    Exponential,
}

impl fmt::Display for DelayStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DelayStrategy::Fixed => write!(f, "FIXED"),
            DelayStrategy::Linear => write!(f, "LINEAR"),
            DelayStrategy::Exponential => write!(f, "EXPONENTIAL"),
        }
    }
}

/// Retry policy for upstream forwarding
///
/// A request gets one initial attempt plus up to `budget` retries. The delay
/// before retry `k` is `delay_for(k)` where `k` is the 1-based index of the
/// attempt that just failed.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt
    pub budget: u32,
    /// Backoff strategy
    pub strategy: DelayStrategy,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Upper bound on a single delay
    pub max_delay: Duration,
    /// Add random jitter (±25%) to delays
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            budget: 3,
            strategy: DelayStrategy::Linear,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Total number of forward attempts permitted for a single request
    pub fn max_attempts(&self) -> u32 {
        self.budget.saturating_add(1)
    }

    /// Calculate the delay applied after the given failed attempt (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let scaled = match self.strategy {
            DelayStrategy::Fixed => self.base_delay,
            DelayStrategy::Linear => self.base_delay.saturating_mul(attempt),
            DelayStrategy::Exponential => {
                // One doubling per failed attempt; beyond 2^31 the cap
                // below decides anyway
                let doublings = attempt.saturating_sub(1).min(31);
                self.base_delay.saturating_mul(1u32 << doublings)
            }
        };

        let capped = scaled.min(self.max_delay);
        if self.jitter {
            add_jitter(capped).min(self.max_delay)
        } else {
            capped
        }
    }

    /// Sleep before the next attempt, aborting early if the shared
    /// cancellation handle fires.
    pub async fn sleep_before_retry(
        &self,
        attempt: u32,
        cancel: &CancellationToken,
    ) -> SteerResult<()> {
        let delay = self.delay_for(attempt);
        if delay.is_zero() {
            return Ok(());
        }

        tokio::select! {
            _ = cancel.cancelled() => Err(SteerError::cancelled("retry delay")),
            _ = sleep(delay) => Ok(()),
        }
    }
}

/// Apply random jitter of up to ±25% to a delay.
fn add_jitter(duration: Duration) -> Duration {
    use rand::Rng;

    duration.mul_f64(rand::thread_rng().gen_range(0.75..=1.25))
}
