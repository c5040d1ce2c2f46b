//! Pipeline configuration
//!
//! Retry budgets, backoff, per-stage time limits and lease timing are all
//! policy: each has a development default and a `PIPELINE_*` override.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use super::framework::policy::StagePolicy;
use super::framework::types::StageName;

pub const DEFAULT_WORKER_COUNT: usize = 4;
pub const DEFAULT_LEASE_SECS: u64 = 300;
pub const DEFAULT_CLAIM_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_MAX_DELIVERIES: u32 = 10;

/// Which persistence the pipeline state lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PipelineBackend {
    #[default]
    Postgres,
    /// Process-local state, lost on restart
    Memory,
}

impl FromStr for PipelineBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(PipelineBackend::Postgres),
            "memory" | "mem" => Ok(PipelineBackend::Memory),
            other => anyhow::bail!("Invalid PIPELINE_BACKEND: {}. Must be 'postgres' or 'memory'", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub backend: PipelineBackend,
    /// Whether this process runs workers (the API can run without them)
    pub workers_enabled: bool,
    pub worker_count: usize,
    pub lease_duration: Duration,
    /// How long one claim call waits for work
    pub claim_timeout: Duration,
    pub poll_interval: Duration,
    /// Deliveries of one message before the queue itself dead-letters it
    pub max_deliveries: u32,
    pub extractor_version: String,
    policies: BTreeMap<StageName, StagePolicy>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            backend: PipelineBackend::Postgres,
            workers_enabled: true,
            worker_count: DEFAULT_WORKER_COUNT,
            lease_duration: Duration::from_secs(DEFAULT_LEASE_SECS),
            claim_timeout: Duration::from_secs(DEFAULT_CLAIM_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_deliveries: DEFAULT_MAX_DELIVERIES,
            extractor_version: default_extractor_version(),
            policies: StageName::ALL
                .into_iter()
                .map(|stage| (stage, default_policy(stage)))
                .collect(),
        }
    }
}

fn default_extractor_version() -> String {
    format!("casefile-mbox/{}", env!("CARGO_PKG_VERSION"))
}

fn default_policy(stage: StageName) -> StagePolicy {
    let base = StagePolicy::default();
    match stage {
        StageName::Extract => StagePolicy {
            timeout: Duration::from_secs(1_800),
            ..base
        },
        StageName::Load => StagePolicy {
            timeout: Duration::from_secs(900),
            ..base
        },
        StageName::Thread | StageName::Dedupe | StageName::Index => StagePolicy {
            max_attempts: 5,
            timeout: Duration::from_secs(300),
            ..base
        },
    }
}

fn env_or<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: '{}' ({})", name, raw, e)),
        _ => Ok(default),
    }
}

impl PipelineConfig {
    /// Load from `PIPELINE_*` environment variables.
    ///
    /// Per-stage keys: `PIPELINE_<STAGE>_MAX_ATTEMPTS`, `_BASE_DELAY_MS`,
    /// `_MAX_DELAY_MS`, `_JITTER`, `_TIMEOUT_SECS` with `<STAGE>` one of
    /// EXTRACT, LOAD, THREAD, DEDUPE, INDEX.
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let mut policies = BTreeMap::new();
        for stage in StageName::ALL {
            let base = defaults.policy(stage);
            let key = |suffix: &str| {
                format!("PIPELINE_{}_{}", stage.as_str().to_ascii_uppercase(), suffix)
            };
            policies.insert(
                stage,
                StagePolicy {
                    max_attempts: env_or(&key("MAX_ATTEMPTS"), base.max_attempts)?,
                    base_delay: Duration::from_millis(env_or(
                        &key("BASE_DELAY_MS"),
                        base.base_delay.as_millis() as u64,
                    )?),
                    max_delay: Duration::from_millis(env_or(
                        &key("MAX_DELAY_MS"),
                        base.max_delay.as_millis() as u64,
                    )?),
                    jitter: env_or(&key("JITTER"), base.jitter)?,
                    timeout: Duration::from_secs(env_or(
                        &key("TIMEOUT_SECS"),
                        base.timeout.as_secs(),
                    )?),
                },
            );
        }

        let config = Self {
            backend: env_or("PIPELINE_BACKEND", defaults.backend)?,
            workers_enabled: env_or("PIPELINE_WORKERS_ENABLED", defaults.workers_enabled)?,
            worker_count: env_or("PIPELINE_WORKER_COUNT", defaults.worker_count)?,
            lease_duration: Duration::from_secs(env_or("PIPELINE_LEASE_SECS", DEFAULT_LEASE_SECS)?),
            claim_timeout: Duration::from_secs(env_or(
                "PIPELINE_CLAIM_TIMEOUT_SECS",
                DEFAULT_CLAIM_TIMEOUT_SECS,
            )?),
            poll_interval: Duration::from_millis(env_or(
                "PIPELINE_POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
            )?),
            max_deliveries: env_or("PIPELINE_MAX_DELIVERIES", defaults.max_deliveries)?,
            extractor_version: env_or("PIPELINE_EXTRACTOR_VERSION", defaults.extractor_version)?,
            policies,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.workers_enabled && self.worker_count == 0 {
            anyhow::bail!("PIPELINE_WORKER_COUNT must be greater than 0");
        }
        if self.lease_duration.is_zero() {
            anyhow::bail!("PIPELINE_LEASE_SECS must be greater than 0");
        }
        if self.max_deliveries == 0 {
            anyhow::bail!("PIPELINE_MAX_DELIVERIES must be greater than 0");
        }
        if self.extractor_version.trim().is_empty() {
            anyhow::bail!("PIPELINE_EXTRACTOR_VERSION cannot be empty");
        }
        for stage in StageName::ALL {
            let policy = self.policy(stage);
            policy.validate(stage.as_str())?;
            if policy.max_attempts > self.max_deliveries {
                tracing::warn!(
                    stage = %stage,
                    max_attempts = policy.max_attempts,
                    max_deliveries = self.max_deliveries,
                    "Delivery budget is smaller than the stage retry budget; the queue will dead-letter first"
                );
            }
        }
        Ok(())
    }

    pub fn policy(&self, stage: StageName) -> StagePolicy {
        self.policies
            .get(&stage)
            .cloned()
            .unwrap_or_else(|| default_policy(stage))
    }

    pub fn with_policy(mut self, stage: StageName, policy: StagePolicy) -> Self {
        self.policies.insert(stage, policy);
        self
    }

    /// Apply one policy to every stage
    pub fn with_uniform_policy(mut self, policy: StagePolicy) -> Self {
        for stage in StageName::ALL {
            self.policies.insert(stage, policy.clone());
        }
        self
    }

    /// Interval at which a worker renews the lease on a running stage
    pub fn heartbeat_interval(&self) -> Duration {
        (self.lease_duration / 3).max(Duration::from_millis(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.policy(StageName::Extract).max_attempts, 3);
        assert_eq!(config.policy(StageName::Index).max_attempts, 5);
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(100));
    }

    #[test]
    fn test_overrides() {
        let tight = StagePolicy {
            max_attempts: 1,
            ..StagePolicy::default()
        };
        let config = PipelineConfig::default().with_policy(StageName::Load, tight.clone());
        assert_eq!(config.policy(StageName::Load), tight);
        assert_ne!(config.policy(StageName::Extract), tight);

        let uniform = PipelineConfig::default().with_uniform_policy(tight.clone());
        assert!(StageName::ALL.iter().all(|s| uniform.policy(*s) == tight));
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!("memory".parse::<PipelineBackend>().unwrap(), PipelineBackend::Memory);
        assert_eq!("Postgres".parse::<PipelineBackend>().unwrap(), PipelineBackend::Postgres);
        assert!("redis".parse::<PipelineBackend>().is_err());
    }

    #[test]
    fn test_invalid_config() {
        let config = PipelineConfig {
            max_deliveries: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
