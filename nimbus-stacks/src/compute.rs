//! Compute unit: Fargate cluster, task definition and service
//!
//! The service starts attached to the blue pool and hands deployments to the
//! release unit (`CODE_DEPLOY` controller).

use nimbus_core::resources::ecs::{
    AwsLogDriverMode, AwsVpcConfiguration, Cluster, ContainerDefinition, DeploymentController,
    DeploymentControllerType, LogConfiguration, NetworkConfiguration, PortMapping, Service,
    ServiceLoadBalancer, TaskDefinition,
};
use nimbus_core::resources::iam::{Policy, PolicyDocument, PolicyStatement, Role};
use nimbus_core::resources::logs::LogGroup;
use nimbus_core::{Environment, Handle, RemovalPolicy, Stack, Token};

use crate::balancer::EdgeHandles;
use crate::config::TopologyConfig;
use crate::error::Result;
use crate::network::NetworkHandles;
use crate::registry::RegistryHandles;

pub const STACK_ID: &str = "EcsStack";

const LOG_BUFFER_MIB: u32 = 50;

#[derive(Debug, Clone)]
pub struct ComputeHandles {
    pub cluster_name: Handle,
    pub service_name: Handle,
    pub service_arn: Handle,
    /// Container the release unit shifts traffic to
    pub container_name: String,
    pub container_port: u16,
}

pub struct EcsStack {
    pub stack: Stack,
    pub handles: ComputeHandles,
}

impl EcsStack {
    pub fn build(
        env: &Environment,
        config: &TopologyConfig,
        registry: &RegistryHandles,
        network: &NetworkHandles,
        edge: &EdgeHandles,
    ) -> Result<Self> {
        let mut stack = Stack::new(STACK_ID, env.clone(), "Compute: Fargate service");

        let repository_name = stack.import(&registry.repository_name);
        let repository_arn = stack.import(&registry.repository_arn);
        let subnets = network
            .public_subnets
            .iter()
            .map(|subnet| stack.import(subnet))
            .collect();
        let compute_group = stack.import(&network.compute);
        let blue_pool = stack.import(&edge.blue.arn);

        let family = config.service_scoped("td");
        let log_group_name = format!("/ecs/{}", family);
        let log_group = stack.add_with_policy(
            "ServiceLogGroup",
            &LogGroup {
                log_group_name: log_group_name.clone(),
                retention_in_days: config.log_retention_days,
            },
            RemovalPolicy::Destroy,
        )?;

        stack.add(
            "EcsTaskRole",
            &Role::assumed_by("ecs-tasks.amazonaws.com")
                .named("ecsTaskRole")
                .described("Role for ECS tasks with access to S3 and DocumentDB")
                .with_managed_policy("AmazonS3FullAccess")
                .with_managed_policy("AmazonDocDBFullAccess"),
        )?;

        let execution_role = stack.add(
            "EcsTaskExecutionRole",
            &Role::assumed_by("ecs-tasks.amazonaws.com")
                .named("ecsTaskExecutionRole")
                .described("Role for ECS tasks to retrieve secrets from Secrets Manager"),
        )?;

        stack.add(
            "EcsTaskExecutionRoleDefaultPolicy",
            &Policy {
                policy_name: "EcsTaskExecutionRoleDefaultPolicy".to_string(),
                policy_document: PolicyDocument::new(vec![
                    PolicyStatement::allow_all(&["secretsmanager:GetSecretValue"]),
                    PolicyStatement::allow(
                        &[
                            "ecr:BatchCheckLayerAvailability",
                            "ecr:GetDownloadUrlForLayer",
                            "ecr:BatchGetImage",
                        ],
                        vec![repository_arn],
                    ),
                    PolicyStatement::allow_all(&["ecr:GetAuthorizationToken"]),
                    PolicyStatement::allow(
                        &["logs:CreateLogStream", "logs:PutLogEvents"],
                        vec![Token::attr("ServiceLogGroup", "Arn")],
                    ),
                ]),
                roles: vec![execution_role.clone()],
            },
        )?;

        let image = Token::concat(vec![
            Token::AccountId,
            ".dkr.ecr.".into(),
            Token::Region,
            ".".into(),
            Token::UrlSuffix,
            "/".into(),
            repository_name,
            format!(":{}", config.image_tag).into(),
        ]);

        let task_definition = stack.add(
            "TaskDefinition",
            &TaskDefinition {
                family: family.clone(),
                cpu: config.task_cpu.to_string(),
                memory: config.task_memory_mib.to_string(),
                network_mode: "awsvpc".to_string(),
                requires_compatibilities: vec!["FARGATE".to_string()],
                task_role_arn: Token::attr("EcsTaskRole", "Arn"),
                execution_role_arn: Token::attr("EcsTaskExecutionRole", "Arn"),
                container_definitions: vec![ContainerDefinition {
                    name: config.service.clone(),
                    image,
                    essential: true,
                    port_mappings: vec![PortMapping {
                        container_port: config.container_port,
                        name: config.service_scoped("port"),
                        protocol: "tcp".to_string(),
                    }],
                    log_configuration: LogConfiguration::aws_logs(
                        log_group,
                        "ecs",
                        AwsLogDriverMode::NonBlocking,
                        LOG_BUFFER_MIB,
                    ),
                }],
            },
        )?;
        stack.depends_on("TaskDefinition", "EcsTaskExecutionRoleDefaultPolicy")?;

        let cluster = stack.add(
            "Cluster",
            &Cluster {
                cluster_name: config.prefixed("cluster"),
            },
        )?;

        stack.add_with_policy(
            "Service",
            &Service {
                service_name: config.service_scoped("service"),
                cluster: cluster.clone(),
                task_definition,
                desired_count: config.desired_count,
                launch_type: "FARGATE".to_string(),
                deployment_controller: DeploymentController {
                    controller_type: DeploymentControllerType::CodeDeploy,
                },
                network_configuration: NetworkConfiguration {
                    awsvpc_configuration: AwsVpcConfiguration {
                        assign_public_ip: "ENABLED".to_string(),
                        subnets,
                        security_groups: vec![compute_group],
                    },
                },
                load_balancers: vec![ServiceLoadBalancer {
                    container_name: config.service.clone(),
                    container_port: config.container_port,
                    target_group_arn: blue_pool,
                }],
            },
            RemovalPolicy::Destroy,
        )?;

        let handles = ComputeHandles {
            cluster_name: stack.export("ClusterName", cluster)?,
            service_name: stack.export("ServiceName", Token::attr("Service", "Name"))?,
            service_arn: stack.export("ServiceArn", Token::reference("Service"))?,
            container_name: config.service.clone(),
            container_port: config.container_port,
        };

        Ok(Self { stack, handles })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balancer::AlbStack;
    use crate::network::NetworkStack;
    use crate::registry::EcrStack;
    use nimbus_core::StackId;

    fn build() -> EcsStack {
        let env = Environment::new("039612877479", "us-east-1").unwrap();
        let config = TopologyConfig::default();
        let network = NetworkStack::build(&env, &config).unwrap();
        let registry = EcrStack::build(&env, &config).unwrap();
        let edge = AlbStack::build(&env, &config, &network.handles).unwrap();
        EcsStack::build(&env, &config, &registry.handles, &network.handles, &edge.handles).unwrap()
    }

    #[test]
    fn test_compute_dependencies() {
        let compute = build();
        let deps: Vec<&str> = compute
            .stack
            .dependencies()
            .iter()
            .map(StackId::as_str)
            .collect();
        assert_eq!(deps, vec!["AlbStack", "EcrStack", "NetworkStack"]);
    }

    #[test]
    fn test_task_definition() {
        let compute = build();
        let task = &compute.stack.template().resource("TaskDefinition").unwrap().properties;

        assert_eq!(task["Family"], "superman-td");
        assert_eq!(task["Cpu"], "512");
        assert_eq!(task["Memory"], "1024");

        let container = &task["ContainerDefinitions"][0];
        assert_eq!(container["Name"], "superman");
        assert_eq!(container["PortMappings"][0]["ContainerPort"], 8080);
        assert_eq!(container["PortMappings"][0]["Name"], "superman-port");
        assert_eq!(container["LogConfiguration"]["Options"]["mode"], "non-blocking");
        assert_eq!(container["LogConfiguration"]["Options"]["max-buffer-size"], "50m");
    }

    #[test]
    fn test_service_starts_on_blue_pool() {
        let compute = build();
        let service = compute.stack.template().resource("Service").unwrap();

        assert_eq!(service.properties["DeploymentController"]["Type"], "CODE_DEPLOY");
        assert_eq!(
            service.properties["LoadBalancers"][0]["TargetGroupArn"]["Fn::ImportValue"],
            "AlbStack:BlueTargetGroupArn"
        );
        assert_eq!(
            service.properties["NetworkConfiguration"]["AwsvpcConfiguration"]["AssignPublicIp"],
            "ENABLED"
        );
        assert_eq!(service.deletion_policy.as_deref(), Some("Delete"));
    }
}
