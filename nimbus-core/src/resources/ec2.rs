//! Networking: VPC, subnets, routing, endpoints and security groups

use serde::Serialize;

use super::{ResourceProps, Tag};
use crate::token::Token;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Vpc {
    pub cidr_block: String,
    pub enable_dns_hostnames: bool,
    pub enable_dns_support: bool,
    pub instance_tenancy: String,
    pub tags: Vec<Tag>,
}

impl ResourceProps for Vpc {
    const TYPE: &'static str = "AWS::EC2::VPC";
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Subnet {
    pub vpc_id: Token,
    pub cidr_block: String,
    pub availability_zone: Token,
    pub map_public_ip_on_launch: bool,
    pub tags: Vec<Tag>,
}

impl ResourceProps for Subnet {
    const TYPE: &'static str = "AWS::EC2::Subnet";
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InternetGateway {
    pub tags: Vec<Tag>,
}

impl ResourceProps for InternetGateway {
    const TYPE: &'static str = "AWS::EC2::InternetGateway";
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct VpcGatewayAttachment {
    pub vpc_id: Token,
    pub internet_gateway_id: Token,
}

impl ResourceProps for VpcGatewayAttachment {
    const TYPE: &'static str = "AWS::EC2::VPCGatewayAttachment";
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RouteTable {
    pub vpc_id: Token,
    pub tags: Vec<Tag>,
}

impl ResourceProps for RouteTable {
    const TYPE: &'static str = "AWS::EC2::RouteTable";
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Route {
    pub route_table_id: Token,
    pub destination_cidr_block: String,
    pub gateway_id: Token,
}

impl ResourceProps for Route {
    const TYPE: &'static str = "AWS::EC2::Route";
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubnetRouteTableAssociation {
    pub route_table_id: Token,
    pub subnet_id: Token,
}

impl ResourceProps for SubnetRouteTableAssociation {
    const TYPE: &'static str = "AWS::EC2::SubnetRouteTableAssociation";
}

/// Gateway endpoint (S3/DynamoDB) attached to route tables
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct VpcEndpoint {
    pub vpc_id: Token,
    pub service_name: Token,
    pub vpc_endpoint_type: String,
    pub route_table_ids: Vec<Token>,
}

impl VpcEndpoint {
    /// Gateway endpoint for `com.amazonaws.<region>.<service>`
    pub fn gateway(vpc_id: Token, service: &str, route_table_ids: Vec<Token>) -> Self {
        Self {
            vpc_id,
            service_name: Token::concat(vec![
                "com.amazonaws.".into(),
                Token::Region,
                format!(".{}", service).into(),
            ]),
            vpc_endpoint_type: "Gateway".to_string(),
            route_table_ids,
        }
    }
}

impl ResourceProps for VpcEndpoint {
    const TYPE: &'static str = "AWS::EC2::VPCEndpoint";
}

/// Source of an ingress rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngressSource {
    Cidr(String),
    SecurityGroup(Token),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct IngressRule {
    pub ip_protocol: String,
    pub from_port: u16,
    pub to_port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cidr_ip: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_security_group_id: Option<Token>,

    pub description: String,
}

impl IngressRule {
    /// Single TCP port from a source
    pub fn tcp(port: u16, source: IngressSource, description: impl Into<String>) -> Self {
        let (cidr_ip, source_security_group_id) = match source {
            IngressSource::Cidr(cidr) => (Some(cidr), None),
            IngressSource::SecurityGroup(group) => (None, Some(group)),
        };

        Self {
            ip_protocol: "tcp".to_string(),
            from_port: port,
            to_port: port,
            cidr_ip,
            source_security_group_id,
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EgressRule {
    pub ip_protocol: String,
    pub cidr_ip: String,
    pub description: String,
}

impl EgressRule {
    pub fn allow_all() -> Self {
        Self {
            ip_protocol: "-1".to_string(),
            cidr_ip: "0.0.0.0/0".to_string(),
            description: "Allow all outbound traffic by default".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecurityGroup {
    pub group_name: String,
    pub group_description: String,
    pub vpc_id: Token,
    pub security_group_ingress: Vec<IngressRule>,
    pub security_group_egress: Vec<EgressRule>,
}

impl ResourceProps for SecurityGroup {
    const TYPE: &'static str = "AWS::EC2::SecurityGroup";
}
