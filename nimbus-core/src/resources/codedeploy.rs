//! Blue/green release control

use serde::Serialize;

use super::ResourceProps;
use crate::token::Token;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Application {
    pub application_name: String,
    pub compute_platform: String,
}

impl ResourceProps for Application {
    const TYPE: &'static str = "AWS::CodeDeploy::Application";
}

/// Predefined traffic shifting configurations for ECS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcsDeploymentConfig {
    AllAtOnce,
    Linear10PercentEvery1Minute,
    Canary10Percent5Minutes,
}

impl EcsDeploymentConfig {
    pub fn name(&self) -> &'static str {
        match self {
            EcsDeploymentConfig::AllAtOnce => "CodeDeployDefault.ECSAllAtOnce",
            EcsDeploymentConfig::Linear10PercentEvery1Minute => {
                "CodeDeployDefault.ECSLinear10PercentEvery1Minutes"
            }
            EcsDeploymentConfig::Canary10Percent5Minutes => {
                "CodeDeployDefault.ECSCanary10Percent5Minutes"
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeploymentStyle {
    pub deployment_type: String,
    pub deployment_option: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeploymentReadyOption {
    pub action_on_timeout: String,
    pub wait_time_in_minutes: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TerminateBlueInstances {
    pub action: String,
    pub termination_wait_time_in_minutes: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BlueGreenDeploymentConfiguration {
    pub deployment_ready_option: DeploymentReadyOption,
    pub terminate_blue_instances_on_deployment_success: TerminateBlueInstances,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AutoRollbackConfiguration {
    pub enabled: bool,
    pub events: Vec<String>,
}

impl AutoRollbackConfiguration {
    pub fn on_failed_deployment(enabled: bool) -> Self {
        Self {
            enabled,
            events: if enabled {
                vec!["DEPLOYMENT_FAILURE".to_string()]
            } else {
                Vec::new()
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EcsServiceRef {
    pub cluster_name: Token,
    pub service_name: Token,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TargetGroupInfo {
    pub name: Token,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TrafficRoute {
    pub listener_arns: Vec<Token>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TargetGroupPairInfo {
    pub target_groups: Vec<TargetGroupInfo>,
    pub prod_traffic_route: TrafficRoute,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoadBalancerInfo {
    pub target_group_pair_info_list: Vec<TargetGroupPairInfo>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeploymentGroup {
    pub application_name: Token,
    pub deployment_group_name: String,
    pub service_role_arn: Token,
    pub deployment_config_name: String,
    pub deployment_style: DeploymentStyle,
    pub blue_green_deployment_configuration: BlueGreenDeploymentConfiguration,
    pub auto_rollback_configuration: AutoRollbackConfiguration,
    pub ecs_services: Vec<EcsServiceRef>,
    pub load_balancer_info: LoadBalancerInfo,
}

impl ResourceProps for DeploymentGroup {
    const TYPE: &'static str = "AWS::CodeDeploy::DeploymentGroup";
}
