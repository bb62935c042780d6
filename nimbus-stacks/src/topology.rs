//! The assembled deployment topology

use nimbus_core::resources::codepipeline::PipelineSpec;
use nimbus_core::{Environment, Stack, StackId};
use tracing::debug;

use crate::balancer::AlbStack;
use crate::build::CodeBuildStack;
use crate::compute::EcsStack;
use crate::config::TopologyConfig;
use crate::error::Result;
use crate::network::NetworkStack;
use crate::order;
use crate::pipeline::CodePipelineStack;
use crate::registry::EcrStack;
use crate::release::CodeDeployStack;
use crate::storage::S3Stack;

/// Eight stacks sharing one environment, plus the release pipeline layout
#[derive(Debug, Clone)]
pub struct Topology {
    env: Environment,
    stacks: Vec<Stack>,
    pipeline: PipelineSpec,
    auto_rollback: bool,
}

impl Topology {
    /// Instantiates every stack in dependency order, handing each the
    /// handles of the stacks it consumes
    pub fn build(env: &Environment, config: &TopologyConfig) -> Result<Self> {
        config.validate()?;

        let network = NetworkStack::build(env, config)?;
        let registry = EcrStack::build(env, config)?;
        let storage = S3Stack::build(env, config)?;
        let edge = AlbStack::build(env, config, &network.handles)?;
        let build = CodeBuildStack::build(env, config, &storage.handles)?;
        let compute = EcsStack::build(
            env,
            config,
            &registry.handles,
            &network.handles,
            &edge.handles,
        )?;
        let release = CodeDeployStack::build(
            env,
            config,
            &network.handles,
            &edge.handles,
            &compute.handles,
        )?;
        let pipeline = CodePipelineStack::build(env, config, &build.handles, &release.handles)?;

        let topology = Self {
            env: env.clone(),
            pipeline: pipeline.handles.spec,
            auto_rollback: release.handles.auto_rollback,
            stacks: vec![
                network.stack,
                registry.stack,
                storage.stack,
                edge.stack,
                build.stack,
                compute.stack,
                release.stack,
                pipeline.stack,
            ],
        };

        topology.verify()?;
        debug!(env = %topology.env, stacks = topology.stacks.len(), "Topology assembled");

        Ok(topology)
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Stacks in declaration order
    pub fn stacks(&self) -> &[Stack] {
        &self.stacks
    }

    pub fn stack(&self, id: &str) -> Option<&Stack> {
        self.stacks.iter().find(|stack| stack.id().as_str() == id)
    }

    pub fn pipeline(&self) -> &PipelineSpec {
        &self.pipeline
    }

    pub fn auto_rollback(&self) -> bool {
        self.auto_rollback
    }

    pub fn deployment_order(&self) -> Result<Vec<&Stack>> {
        order::deployment_order(&self.stacks)
    }

    pub fn waves(&self) -> Result<Vec<Vec<&Stack>>> {
        order::waves(&self.stacks)
    }

    pub fn verify(&self) -> Result<()> {
        order::verify(&self.stacks)
    }

    /// Every stack that directly or transitively depends on `id`
    pub fn dependents_of(&self, id: &StackId) -> Vec<&StackId> {
        let mut found: Vec<&StackId> = Vec::new();
        let mut frontier = vec![id];

        while let Some(current) = frontier.pop() {
            for stack in &self.stacks {
                if stack.dependencies().contains(current) && !found.contains(&stack.id()) {
                    found.push(stack.id());
                    frontier.push(stack.id());
                }
            }
        }

        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topology() -> Topology {
        let env = Environment::new("039612877479", "us-east-1").unwrap();
        Topology::build(&env, &TopologyConfig::default()).unwrap()
    }

    fn position(order: &[&Stack], id: &str) -> usize {
        order.iter().position(|s| s.id().as_str() == id).unwrap()
    }

    #[test]
    fn test_build_pushes_to_registry_repository() {
        let topology = topology();
        let repository = &topology
            .stack("EcrStack")
            .unwrap()
            .template()
            .resource("Repository")
            .unwrap()
            .properties["RepositoryName"];
        let project = &topology
            .stack("CodeBuildStack")
            .unwrap()
            .template()
            .resource("Project")
            .unwrap()
            .properties;

        let uri = project["Environment"]["EnvironmentVariables"]
            .as_array()
            .unwrap()
            .iter()
            .find(|v| v["Name"] == "REPOSITORY_URI")
            .unwrap()["Value"]["Fn::Sub"]
            .as_str()
            .unwrap();

        assert_eq!(repository, "prod/superman");
        assert!(uri.ends_with(&format!("/{}", repository.as_str().unwrap())));
    }

    #[test]
    fn test_deployment_order() {
        let topology = topology();
        let order = topology.deployment_order().unwrap();
        let names: Vec<&str> = order.iter().map(|s| s.id().as_str()).collect();

        assert_eq!(
            names,
            vec![
                "NetworkStack",
                "EcrStack",
                "S3Stack",
                "AlbStack",
                "CodeBuildStack",
                "EcsStack",
                "CodeDeployStack",
                "CodePipelineStack",
            ]
        );

        for stack in &order {
            for dependency in stack.dependencies() {
                assert!(
                    position(&order, dependency.as_str()) < position(&order, stack.id().as_str())
                );
            }
        }
    }

    #[test]
    fn test_waves() {
        let topology = topology();
        let waves: Vec<Vec<&str>> = topology
            .waves()
            .unwrap()
            .into_iter()
            .map(|wave| wave.into_iter().map(|s| s.id().as_str()).collect())
            .collect();

        assert_eq!(
            waves,
            vec![
                vec!["NetworkStack", "EcrStack", "S3Stack"],
                vec!["AlbStack", "CodeBuildStack"],
                vec!["EcsStack"],
                vec!["CodeDeployStack"],
                vec!["CodePipelineStack"],
            ]
        );
    }

    #[test]
    fn test_declared_dependency_edges() {
        let topology = topology();
        let deps = |id: &str| -> Vec<String> {
            topology
                .stack(id)
                .unwrap()
                .dependencies()
                .iter()
                .map(|d| d.to_string())
                .collect()
        };

        assert!(deps("NetworkStack").is_empty());
        assert!(deps("EcrStack").is_empty());
        assert!(deps("S3Stack").is_empty());
        assert_eq!(deps("AlbStack"), vec!["NetworkStack"]);
        assert_eq!(deps("CodeBuildStack"), vec!["S3Stack"]);
        assert_eq!(deps("EcsStack"), vec!["AlbStack", "EcrStack", "NetworkStack"]);
        assert_eq!(deps("CodeDeployStack"), vec!["AlbStack", "EcsStack", "NetworkStack"]);
        assert_eq!(deps("CodePipelineStack"), vec!["CodeBuildStack", "CodeDeployStack"]);
    }

    #[test]
    fn test_pools_share_listener_port_and_stay_disjoint() {
        let topology = topology();
        let edge = topology.stack("AlbStack").unwrap().template();

        let blue = &edge.resource("BlueTargetGroup").unwrap().properties;
        let green = &edge.resource("GreenTargetGroup").unwrap().properties;
        assert_ne!(blue["Name"], green["Name"]);
        assert_eq!(blue["Port"], 80);
        assert_eq!(green["Port"], 80);
    }

    #[test]
    fn test_every_stack_in_one_environment() {
        let topology = topology();
        assert!(topology.stacks().iter().all(|s| s.env() == topology.env()));
    }

    #[test]
    fn test_dependents_of_network() {
        let topology = topology();
        let mut dependents: Vec<&str> = topology
            .dependents_of(&StackId::new("NetworkStack"))
            .into_iter()
            .map(StackId::as_str)
            .collect();
        dependents.sort();

        assert_eq!(
            dependents,
            vec!["AlbStack", "CodeDeployStack", "CodePipelineStack", "EcsStack"]
        );
    }

    #[test]
    fn test_pipeline_layout() {
        let topology = topology();
        let stages: Vec<&str> = topology
            .pipeline()
            .stages
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(stages, vec!["Source", "Build", "Deploy"]);
        assert!(topology.auto_rollback());
    }
}
