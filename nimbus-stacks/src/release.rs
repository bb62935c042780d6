//! Release-orchestration unit
//!
//! Blue/green deployment group shifting the listener between the two pools
//! of the edge unit for the compute unit's service.

use nimbus_core::resources::codedeploy::{
    Application, AutoRollbackConfiguration, BlueGreenDeploymentConfiguration, DeploymentGroup,
    DeploymentReadyOption, DeploymentStyle, EcsDeploymentConfig, EcsServiceRef, LoadBalancerInfo,
    TargetGroupInfo, TargetGroupPairInfo, TerminateBlueInstances, TrafficRoute,
};
use nimbus_core::resources::iam::Role;
use nimbus_core::{Environment, Handle, Stack, Token};

use crate::balancer::EdgeHandles;
use crate::compute::ComputeHandles;
use crate::config::TopologyConfig;
use crate::error::Result;
use crate::network::NetworkHandles;

pub const STACK_ID: &str = "CodeDeployStack";

const ROLE_ID: &str = "CodeDeployRole";

#[derive(Debug, Clone)]
pub struct ReleaseHandles {
    pub application_name: Handle,
    pub deployment_group_name: Handle,
    pub config: EcsDeploymentConfig,
    pub auto_rollback: bool,
}

pub struct CodeDeployStack {
    pub stack: Stack,
    pub handles: ReleaseHandles,
}

impl CodeDeployStack {
    pub fn build(
        env: &Environment,
        config: &TopologyConfig,
        network: &NetworkHandles,
        edge: &EdgeHandles,
        compute: &ComputeHandles,
    ) -> Result<Self> {
        let mut stack = Stack::new(
            STACK_ID,
            env.clone(),
            "Release: blue/green deployment group",
        );

        // Replacement tasks join the compute group
        stack.require(&network.compute);

        let blue = stack.import(&edge.blue.name);
        let green = stack.import(&edge.green.name);
        let listener = stack.import(&edge.listener);
        let cluster = stack.import(&compute.cluster_name);
        let service = stack.import(&compute.service_name);

        let application = stack.add(
            "Application",
            &Application {
                application_name: config.service.clone(),
                compute_platform: "ECS".to_string(),
            },
        )?;

        stack.add(
            ROLE_ID,
            &Role::assumed_by("codedeploy.amazonaws.com")
                .with_managed_policy("AWSCodeDeployRoleForECS"),
        )?;

        let deployment_config = EcsDeploymentConfig::AllAtOnce;
        let group = stack.add(
            "DeploymentGroup",
            &DeploymentGroup {
                application_name: application.clone(),
                deployment_group_name: config.service_scoped("group"),
                service_role_arn: Token::attr(ROLE_ID, "Arn"),
                deployment_config_name: deployment_config.name().to_string(),
                deployment_style: DeploymentStyle {
                    deployment_type: "BLUE_GREEN".to_string(),
                    deployment_option: "WITH_TRAFFIC_CONTROL".to_string(),
                },
                blue_green_deployment_configuration: BlueGreenDeploymentConfiguration {
                    deployment_ready_option: DeploymentReadyOption {
                        action_on_timeout: "CONTINUE_DEPLOYMENT".to_string(),
                        wait_time_in_minutes: 0,
                    },
                    terminate_blue_instances_on_deployment_success: TerminateBlueInstances {
                        action: "TERMINATE".to_string(),
                        termination_wait_time_in_minutes: 0,
                    },
                },
                auto_rollback_configuration: AutoRollbackConfiguration::on_failed_deployment(
                    config.auto_rollback,
                ),
                ecs_services: vec![EcsServiceRef {
                    cluster_name: cluster,
                    service_name: service,
                }],
                load_balancer_info: LoadBalancerInfo {
                    target_group_pair_info_list: vec![TargetGroupPairInfo {
                        target_groups: vec![
                            TargetGroupInfo { name: blue },
                            TargetGroupInfo { name: green },
                        ],
                        prod_traffic_route: TrafficRoute {
                            listener_arns: vec![listener],
                        },
                    }],
                },
            },
        )?;

        let handles = ReleaseHandles {
            application_name: stack.export("ApplicationName", application)?,
            deployment_group_name: stack.export("DeploymentGroupName", group)?,
            config: deployment_config,
            auto_rollback: config.auto_rollback,
        };

        Ok(Self { stack, handles })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balancer::AlbStack;
    use crate::compute::EcsStack;
    use crate::network::NetworkStack;
    use crate::registry::EcrStack;
    use nimbus_core::StackId;

    fn build(config: &TopologyConfig) -> CodeDeployStack {
        let env = Environment::new("039612877479", "us-east-1").unwrap();
        let network = NetworkStack::build(&env, config).unwrap();
        let registry = EcrStack::build(&env, config).unwrap();
        let edge = AlbStack::build(&env, config, &network.handles).unwrap();
        let compute =
            EcsStack::build(&env, config, &registry.handles, &network.handles, &edge.handles)
                .unwrap();
        CodeDeployStack::build(&env, config, &network.handles, &edge.handles, &compute.handles)
            .unwrap()
    }

    #[test]
    fn test_release_dependencies() {
        let release = build(&TopologyConfig::default());
        let deps: Vec<&str> = release
            .stack
            .dependencies()
            .iter()
            .map(StackId::as_str)
            .collect();
        assert_eq!(deps, vec!["AlbStack", "EcsStack", "NetworkStack"]);
    }

    #[test]
    fn test_deployment_group_pairs_pools() {
        let release = build(&TopologyConfig::default());
        let group = &release
            .stack
            .template()
            .resource("DeploymentGroup")
            .unwrap()
            .properties;

        assert_eq!(group["DeploymentGroupName"], "superman-group");
        assert_eq!(group["DeploymentConfigName"], "CodeDeployDefault.ECSAllAtOnce");
        assert_eq!(group["DeploymentStyle"]["DeploymentType"], "BLUE_GREEN");
        assert_eq!(group["AutoRollbackConfiguration"]["Events"][0], "DEPLOYMENT_FAILURE");

        let pair = &group["LoadBalancerInfo"]["TargetGroupPairInfoList"][0];
        assert_eq!(
            pair["TargetGroups"][0]["Name"]["Fn::ImportValue"],
            "AlbStack:BlueTargetGroupName"
        );
        assert_eq!(
            pair["TargetGroups"][1]["Name"]["Fn::ImportValue"],
            "AlbStack:GreenTargetGroupName"
        );
        assert_eq!(
            pair["ProdTrafficRoute"]["ListenerArns"][0]["Fn::ImportValue"],
            "AlbStack:ListenerArn"
        );
    }

    #[test]
    fn test_auto_rollback_can_be_disabled() {
        let config = TopologyConfig {
            auto_rollback: false,
            ..TopologyConfig::default()
        };
        let release = build(&config);
        let group = &release
            .stack
            .template()
            .resource("DeploymentGroup")
            .unwrap()
            .properties;

        assert_eq!(group["AutoRollbackConfiguration"]["Enabled"], false);
        assert!(!release.handles.auto_rollback);
    }
}
