//! Retry budget and backoff policy per stage

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry and time budget for one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagePolicy {
    /// Executions allowed before the job is dead-lettered (at least 1)
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the computed delay that may be shaved off at random, 0.0..=1.0
    pub jitter: f64,
    /// Wall-clock limit for a single execution
    pub timeout: Duration,
}

impl Default for StagePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            jitter: 0.2,
            timeout: Duration::from_secs(600),
        }
    }
}

impl StagePolicy {
    /// Exponential delay before retry number `attempt` (1-indexed), capped at `max_delay`
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exp = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exp)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// `backoff` with up to `jitter` of it removed uniformly at random
    pub fn backoff_with_jitter(&self, attempt: u32) -> Duration {
        let delay = self.backoff(attempt);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 || delay.is_zero() {
            return delay;
        }
        let factor = rand::thread_rng().gen_range((1.0 - jitter)..=1.0);
        delay.mul_f64(factor)
    }

    pub fn validate(&self, stage: &str) -> anyhow::Result<()> {
        if self.max_attempts == 0 {
            anyhow::bail!("{} max_attempts must be at least 1", stage);
        }
        if self.base_delay > self.max_delay {
            anyhow::bail!(
                "{} base delay ({:?}) cannot exceed max delay ({:?})",
                stage,
                self.base_delay,
                self.max_delay
            );
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            anyhow::bail!("{} jitter must be between 0.0 and 1.0", stage);
        }
        if self.timeout.is_zero() {
            anyhow::bail!("{} timeout must be greater than 0", stage);
        }
        Ok(())
    }
}
