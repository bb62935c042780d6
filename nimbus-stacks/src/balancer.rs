//! Edge-balancing unit
//!
//! Internet-facing load balancer with two interchangeable target pools. The
//! listener's default action points at a fallback pool; the API path rule
//! selects the production pool, and a release moves that rule between
//! `blue` and `green`.

use nimbus_core::resources::elbv2::{
    Listener, ListenerAction, ListenerRule, LoadBalancer, Protocol, RuleCondition, TargetGroup,
    TargetType,
};
use nimbus_core::{Environment, Handle, Stack, Token};

use crate::config::TopologyConfig;
use crate::error::Result;
use crate::network::NetworkHandles;

pub const STACK_ID: &str = "AlbStack";

/// ARN and name of a target pool
#[derive(Debug, Clone)]
pub struct PoolHandles {
    pub arn: Handle,
    pub name: Handle,
}

#[derive(Debug, Clone)]
pub struct EdgeHandles {
    pub blue: PoolHandles,
    pub green: PoolHandles,
    pub fallback: Handle,
    pub listener: Handle,
    pub api_rule: Handle,
    pub dns_name: Handle,
}

pub struct AlbStack {
    pub stack: Stack,
    pub handles: EdgeHandles,
}

impl AlbStack {
    pub fn build(
        env: &Environment,
        config: &TopologyConfig,
        network: &NetworkHandles,
    ) -> Result<Self> {
        let mut stack = Stack::new(
            STACK_ID,
            env.clone(),
            "Edge: load balancer, target pools and listener",
        );

        let vpc = stack.import(&network.vpc);
        let subnets = network
            .public_subnets
            .iter()
            .map(|subnet| stack.import(subnet))
            .collect();
        let edge_group = stack.import(&network.edge);

        let balancer = stack.add(
            "LoadBalancer",
            &LoadBalancer::internet_facing(
                &format!("{}-ALB", config.prefix.to_uppercase()),
                subnets,
                edge_group,
            ),
        )?;

        let pool = |name: String, health_check_path: &str| TargetGroup {
            name,
            port: config.listener_port,
            protocol: Protocol::Http,
            target_type: TargetType::Ip,
            vpc_id: vpc.clone(),
            health_check_enabled: true,
            health_check_path: health_check_path.to_string(),
            health_check_protocol: Protocol::Http,
        };

        let blue = stack.add(
            "BlueTargetGroup",
            &pool("blue-user-tg".to_string(), &config.health_check_path),
        )?;
        let green = stack.add(
            "GreenTargetGroup",
            &pool("green-user-tg".to_string(), &config.health_check_path),
        )?;
        let fallback = stack.add("DefaultTargetGroup", &pool("default".to_string(), "/"))?;

        let listener = stack.add(
            "HttpListener",
            &Listener {
                load_balancer_arn: balancer,
                port: config.listener_port,
                protocol: Protocol::Http,
                default_actions: vec![ListenerAction::forward(fallback.clone())],
            },
        )?;

        let api_rule = stack.add(
            "ApiForwardingRule",
            &ListenerRule {
                listener_arn: listener.clone(),
                priority: 1,
                conditions: vec![RuleCondition::path_patterns(&[&config.api_path_pattern])],
                actions: vec![ListenerAction::forward(blue.clone())],
            },
        )?;

        let handles = EdgeHandles {
            blue: PoolHandles {
                arn: stack.export("BlueTargetGroupArn", blue)?,
                name: stack.export(
                    "BlueTargetGroupName",
                    Token::attr("BlueTargetGroup", "TargetGroupName"),
                )?,
            },
            green: PoolHandles {
                arn: stack.export("GreenTargetGroupArn", green)?,
                name: stack.export(
                    "GreenTargetGroupName",
                    Token::attr("GreenTargetGroup", "TargetGroupName"),
                )?,
            },
            fallback: stack.export("DefaultTargetGroupArn", fallback)?,
            listener: stack.export("ListenerArn", listener)?,
            api_rule: stack.export("ApiForwardingRuleArn", api_rule)?,
            dns_name: stack.export(
                "LoadBalancerDnsName",
                Token::attr("LoadBalancer", "DNSName"),
            )?,
        };

        Ok(Self { stack, handles })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{self, NetworkStack};
    use nimbus_core::StackId;

    fn build() -> AlbStack {
        let env = Environment::new("039612877479", "us-east-1").unwrap();
        let config = TopologyConfig::default();
        let network = NetworkStack::build(&env, &config).unwrap();
        AlbStack::build(&env, &config, &network.handles).unwrap()
    }

    #[test]
    fn test_edge_depends_only_on_network() {
        let edge = build();
        let deps: Vec<&StackId> = edge.stack.dependencies().iter().collect();
        assert_eq!(deps, vec![&StackId::new(network::STACK_ID)]);
    }

    #[test]
    fn test_pools_are_interchangeable() {
        let edge = build();
        let template = edge.stack.template();

        let blue = &template.resource("BlueTargetGroup").unwrap().properties;
        let green = &template.resource("GreenTargetGroup").unwrap().properties;

        assert_eq!(blue["Name"], "blue-user-tg");
        assert_eq!(green["Name"], "green-user-tg");
        for key in ["Port", "Protocol", "TargetType", "HealthCheckPath", "VpcId"] {
            assert_eq!(blue[key], green[key], "{} differs between pools", key);
        }
        assert_eq!(blue["TargetType"], "ip");
        assert_eq!(blue["HealthCheckPath"], "/api/v1/health-check");
    }

    #[test]
    fn test_listener_routes_api_to_blue() {
        let edge = build();
        let template = edge.stack.template();

        let listener = &template.resource("HttpListener").unwrap().properties;
        assert_eq!(listener["Port"], 80);
        assert_eq!(
            listener["DefaultActions"][0]["TargetGroupArn"]["Ref"],
            "DefaultTargetGroup"
        );

        let rule = &template.resource("ApiForwardingRule").unwrap().properties;
        assert_eq!(rule["Priority"], 1);
        assert_eq!(rule["Conditions"][0]["PathPatternConfig"]["Values"][0], "/api/*");
        assert_eq!(rule["Actions"][0]["TargetGroupArn"]["Ref"], "BlueTargetGroup");

        let balancer = &template.resource("LoadBalancer").unwrap().properties;
        assert_eq!(balancer["Name"], "NF-ALB");
        assert_eq!(
            balancer["Subnets"][0]["Fn::ImportValue"],
            "NetworkStack:PublicSubnet1Id"
        );
    }
}
