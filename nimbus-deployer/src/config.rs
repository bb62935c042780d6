//! Deployer configuration
//!
//! Concurrency, polling and timeout settings for stack deployments, and the
//! health-check budget of blue/green rollouts.

use std::time::Duration;

/// Deployment scheduling configuration
#[derive(Debug, Clone)]
pub struct DeployerConfig {
    /// Max stacks provisioned at the same time within a wave
    pub max_parallel_stacks: usize,

    /// How often to poll the control plane for a stack's status
    pub poll_interval: Duration,

    /// Maximum time a single stack may take to settle
    pub stack_timeout: Duration,
}

impl DeployerConfig {
    /// Creates a new configuration with defaults
    pub fn new() -> Self {
        Self {
            max_parallel_stacks: 3,
            poll_interval: Duration::from_secs(5),
            stack_timeout: Duration::from_secs(30 * 60),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - NIMBUS_MAX_PARALLEL_STACKS (optional, default: 3)
    /// - NIMBUS_POLL_INTERVAL (optional, seconds, default: 5)
    /// - NIMBUS_STACK_TIMEOUT (optional, seconds, default: 1800)
    pub fn from_env() -> Self {
        let defaults = Self::new();

        let max_parallel_stacks = std::env::var("NIMBUS_MAX_PARALLEL_STACKS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(defaults.max_parallel_stacks);

        let poll_interval = std::env::var("NIMBUS_POLL_INTERVAL")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.poll_interval);

        let stack_timeout = std::env::var("NIMBUS_STACK_TIMEOUT")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.stack_timeout);

        Self {
            max_parallel_stacks,
            poll_interval,
            stack_timeout,
        }
    }

    pub fn with_max_parallel_stacks(mut self, max: usize) -> Self {
        self.max_parallel_stacks = max;
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_parallel_stacks == 0 {
            anyhow::bail!("max_parallel_stacks must be greater than 0");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.stack_timeout < self.poll_interval {
            anyhow::bail!("stack_timeout must be at least one poll_interval");
        }

        Ok(())
    }
}

impl Default for DeployerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Blue/green rollout configuration
#[derive(Debug, Clone)]
pub struct RolloutConfig {
    /// Health probes of the candidate pool before giving up on cut-over
    pub health_attempts: u32,

    /// Delay between consecutive probes
    pub health_interval: Duration,

    /// Probes of the candidate after it starts serving production traffic
    pub bake_checks: u32,

    /// Restore the previous pool when the candidate fails after cut-over
    pub auto_rollback: bool,
}

impl RolloutConfig {
    pub fn new() -> Self {
        Self {
            health_attempts: 3,
            health_interval: Duration::from_secs(10),
            bake_checks: 2,
            auto_rollback: true,
        }
    }

    /// Rollout without delays between probes, for local simulation
    pub fn immediate() -> Self {
        Self {
            health_interval: Duration::ZERO,
            ..Self::new()
        }
    }

    pub fn with_auto_rollback(mut self, enabled: bool) -> Self {
        self.auto_rollback = enabled;
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.health_attempts == 0 {
            anyhow::bail!("health_attempts must be greater than 0");
        }

        Ok(())
    }
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DeployerConfig::default();
        assert_eq!(config.max_parallel_stacks, 3);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.stack_timeout, Duration::from_secs(1800));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = DeployerConfig::default();
        assert!(config.validate().is_ok());

        config.max_parallel_stacks = 0;
        assert!(config.validate().is_err());
        config.max_parallel_stacks = 1;

        config.poll_interval = Duration::ZERO;
        assert!(config.validate().is_err());
        config.poll_interval = Duration::from_secs(5);

        config.stack_timeout = Duration::from_secs(1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rollout_config() {
        let config = RolloutConfig::immediate().with_auto_rollback(false);
        assert_eq!(config.health_interval, Duration::ZERO);
        assert!(!config.auto_rollback);
        assert!(config.validate().is_ok());

        let config = RolloutConfig {
            health_attempts: 0,
            ..RolloutConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
