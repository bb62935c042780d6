//! Container orchestration: cluster, task definition, service

use serde::Serialize;
use std::collections::BTreeMap;

use super::ResourceProps;
use crate::token::Token;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Cluster {
    pub cluster_name: String,
}

impl ResourceProps for Cluster {
    const TYPE: &'static str = "AWS::ECS::Cluster";
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PortMapping {
    pub container_port: u16,
    pub name: String,
    pub protocol: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LogConfiguration {
    pub log_driver: String,
    pub options: BTreeMap<String, Token>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwsLogDriverMode {
    Blocking,
    NonBlocking,
}

impl LogConfiguration {
    /// `awslogs` driver writing to a log group
    pub fn aws_logs(
        log_group: Token,
        stream_prefix: &str,
        mode: AwsLogDriverMode,
        max_buffer_mib: u32,
    ) -> Self {
        let mut options = BTreeMap::new();
        options.insert("awslogs-group".to_string(), log_group);
        options.insert("awslogs-region".to_string(), Token::Region);
        options.insert("awslogs-stream-prefix".to_string(), stream_prefix.into());

        let mode = match mode {
            AwsLogDriverMode::Blocking => "blocking",
            AwsLogDriverMode::NonBlocking => "non-blocking",
        };
        options.insert("mode".to_string(), mode.into());
        options.insert(
            "max-buffer-size".to_string(),
            format!("{}m", max_buffer_mib).into(),
        );

        Self {
            log_driver: "awslogs".to_string(),
            options,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerDefinition {
    pub name: String,
    pub image: Token,
    pub essential: bool,
    pub port_mappings: Vec<PortMapping>,
    pub log_configuration: LogConfiguration,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskDefinition {
    pub family: String,
    pub cpu: String,
    pub memory: String,
    pub network_mode: String,
    pub requires_compatibilities: Vec<String>,
    pub task_role_arn: Token,
    pub execution_role_arn: Token,
    pub container_definitions: Vec<ContainerDefinition>,
}

impl ResourceProps for TaskDefinition {
    const TYPE: &'static str = "AWS::ECS::TaskDefinition";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeploymentControllerType {
    #[serde(rename = "ECS")]
    Ecs,
    #[serde(rename = "CODE_DEPLOY")]
    CodeDeploy,
    #[serde(rename = "EXTERNAL")]
    External,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeploymentController {
    #[serde(rename = "Type")]
    pub controller_type: DeploymentControllerType,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AwsVpcConfiguration {
    pub assign_public_ip: String,
    pub subnets: Vec<Token>,
    pub security_groups: Vec<Token>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkConfiguration {
    pub awsvpc_configuration: AwsVpcConfiguration,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceLoadBalancer {
    pub container_name: String,
    pub container_port: u16,
    pub target_group_arn: Token,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Service {
    pub service_name: String,
    pub cluster: Token,
    pub task_definition: Token,
    pub desired_count: u32,
    pub launch_type: String,
    pub deployment_controller: DeploymentController,
    pub network_configuration: NetworkConfiguration,
    pub load_balancers: Vec<ServiceLoadBalancer>,
}

impl ResourceProps for Service {
    const TYPE: &'static str = "AWS::ECS::Service";
}
