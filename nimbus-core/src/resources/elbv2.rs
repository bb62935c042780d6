//! Application load balancing: balancer, target groups, listener, rules

use serde::Serialize;

use super::ResourceProps;
use crate::token::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Http,
    Https,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Ip,
    Instance,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoadBalancer {
    pub name: String,
    pub scheme: String,
    #[serde(rename = "Type")]
    pub load_balancer_type: String,
    pub subnets: Vec<Token>,
    pub security_groups: Vec<Token>,
}

impl LoadBalancer {
    pub fn internet_facing(name: &str, subnets: Vec<Token>, security_group: Token) -> Self {
        Self {
            name: name.to_string(),
            scheme: "internet-facing".to_string(),
            load_balancer_type: "application".to_string(),
            subnets,
            security_groups: vec![security_group],
        }
    }
}

impl ResourceProps for LoadBalancer {
    const TYPE: &'static str = "AWS::ElasticLoadBalancingV2::LoadBalancer";
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TargetGroup {
    pub name: String,
    pub port: u16,
    pub protocol: Protocol,
    pub target_type: TargetType,
    pub vpc_id: Token,
    pub health_check_enabled: bool,
    pub health_check_path: String,
    pub health_check_protocol: Protocol,
}

impl ResourceProps for TargetGroup {
    const TYPE: &'static str = "AWS::ElasticLoadBalancingV2::TargetGroup";
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListenerAction {
    #[serde(rename = "Type")]
    pub action_type: String,
    pub target_group_arn: Token,
}

impl ListenerAction {
    pub fn forward(target_group_arn: Token) -> Self {
        Self {
            action_type: "forward".to_string(),
            target_group_arn,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Listener {
    pub load_balancer_arn: Token,
    pub port: u16,
    pub protocol: Protocol,
    pub default_actions: Vec<ListenerAction>,
}

impl ResourceProps for Listener {
    const TYPE: &'static str = "AWS::ElasticLoadBalancingV2::Listener";
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PathPatternConfig {
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RuleCondition {
    pub field: String,
    pub path_pattern_config: PathPatternConfig,
}

impl RuleCondition {
    pub fn path_patterns(patterns: &[&str]) -> Self {
        Self {
            field: "path-pattern".to_string(),
            path_pattern_config: PathPatternConfig {
                values: patterns.iter().map(|p| p.to_string()).collect(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListenerRule {
    pub listener_arn: Token,
    pub priority: u32,
    pub conditions: Vec<RuleCondition>,
    pub actions: Vec<ListenerAction>,
}

impl ResourceProps for ListenerRule {
    const TYPE: &'static str = "AWS::ElasticLoadBalancingV2::ListenerRule";
}
