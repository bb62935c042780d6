//! Configuration module
//!
//! Target environment and topology settings shared by every command.

use anyhow::{Context, Result};
use nimbus_core::Environment;
use nimbus_stacks::{Topology, TopologyConfig};

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub account: String,
    pub region: String,
}

impl Config {
    pub fn environment(&self) -> Result<Environment> {
        Environment::new(self.account.as_str(), self.region.as_str())
            .context("Invalid target environment")
    }

    /// Build the topology for the configured environment
    pub fn topology(&self) -> Result<Topology> {
        let env = self.environment()?;
        Topology::build(&env, &TopologyConfig::default()).context("Failed to build topology")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology_for_environment() {
        let config = Config {
            account: "039612877479".to_string(),
            region: "eu-west-1".to_string(),
        };

        let topology = config.topology().unwrap();
        assert_eq!(topology.env().region, "eu-west-1");
        assert_eq!(topology.stacks().len(), 8);
    }

    #[test]
    fn test_invalid_account_rejected() {
        let config = Config {
            account: "not-an-account".to_string(),
            region: "us-east-1".to_string(),
        };

        assert!(config.environment().is_err());
    }
}
