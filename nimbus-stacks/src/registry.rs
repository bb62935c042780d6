//! Registry unit: the container image repository

use nimbus_core::resources::ecr::{LifecyclePolicy, LifecycleRule, Repository, TagStatus};
use nimbus_core::{Environment, Handle, RemovalPolicy, Stack, Token};

use crate::config::TopologyConfig;
use crate::error::Result;

pub const STACK_ID: &str = "EcrStack";

#[derive(Debug, Clone)]
pub struct RegistryHandles {
    pub repository_name: Handle,
    pub repository_arn: Handle,
}

pub struct EcrStack {
    pub stack: Stack,
    pub handles: RegistryHandles,
}

impl EcrStack {
    pub fn build(env: &Environment, config: &TopologyConfig) -> Result<Self> {
        let mut stack = Stack::new(STACK_ID, env.clone(), "Registry: service image repository");

        let rule = LifecycleRule {
            priority: 1,
            description: format!(
                "Remove untagged images older than {} days",
                config.untagged_image_max_age_days
            ),
            tag_status: TagStatus::Untagged,
            max_image_age_days: config.untagged_image_max_age_days,
        };

        // Images outlive the stack
        let repository = stack.add_with_policy(
            "Repository",
            &Repository {
                repository_name: config.repository_name(),
                lifecycle_policy: LifecyclePolicy::from_rules(&[rule])?,
            },
            RemovalPolicy::Retain,
        )?;

        let handles = RegistryHandles {
            repository_name: stack.export("RepositoryName", repository)?,
            repository_arn: stack.export("RepositoryArn", Token::attr("Repository", "Arn"))?,
        };

        Ok(Self { stack, handles })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_is_retained() {
        let env = Environment::new("039612877479", "us-east-1").unwrap();
        let registry = EcrStack::build(&env, &TopologyConfig::default()).unwrap();
        let repository = registry.stack.template().resource("Repository").unwrap();

        assert_eq!(repository.properties["RepositoryName"], "prod/superman");
        assert_eq!(repository.deletion_policy.as_deref(), Some("Retain"));
        assert!(
            repository.properties["LifecyclePolicy"]["LifecyclePolicyText"]
                .as_str()
                .unwrap()
                .contains("Remove untagged images older than 10 days")
        );
        assert_eq!(
            registry.handles.repository_arn.export_name(),
            "EcrStack:RepositoryArn"
        );
    }
}
