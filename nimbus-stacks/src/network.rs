//! Network unit
//!
//! VPC with one public and one private subnet per availability zone, no NAT
//! gateways, an S3 gateway endpoint for the private subnets, and the four
//! isolation groups every other unit attaches to.

use nimbus_core::net::Ipv4Cidr;
use nimbus_core::resources::Tag;
use nimbus_core::resources::ec2::{
    EgressRule, IngressRule, IngressSource, InternetGateway, Route, RouteTable, SecurityGroup,
    Subnet, SubnetRouteTableAssociation, Vpc, VpcEndpoint, VpcGatewayAttachment,
};
use nimbus_core::{Environment, Handle, Stack, Token};

use crate::config::TopologyConfig;
use crate::error::Result;

pub const STACK_ID: &str = "NetworkStack";

const REDIS_PORT: u16 = 6379;
const DOCDB_PORT: u16 = 27017;

/// Traffic-isolation boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationGroup {
    Edge,
    Compute,
    Cache,
    Database,
}

#[derive(Debug, Clone)]
pub struct NetworkHandles {
    pub vpc: Handle,
    pub public_subnets: Vec<Handle>,
    pub private_subnets: Vec<Handle>,
    pub edge: Handle,
    pub compute: Handle,
    pub cache: Handle,
    pub database: Handle,
}

impl NetworkHandles {
    pub fn isolation_group(&self, group: IsolationGroup) -> &Handle {
        match group {
            IsolationGroup::Edge => &self.edge,
            IsolationGroup::Compute => &self.compute,
            IsolationGroup::Cache => &self.cache,
            IsolationGroup::Database => &self.database,
        }
    }
}

pub struct NetworkStack {
    pub stack: Stack,
    pub handles: NetworkHandles,
}

#[derive(Clone, Copy)]
enum SubnetGroup {
    Public,
    Private,
}

impl SubnetGroup {
    fn label(&self) -> &'static str {
        match self {
            SubnetGroup::Public => "Public",
            SubnetGroup::Private => "Private",
        }
    }
}

impl NetworkStack {
    pub fn build(env: &Environment, config: &TopologyConfig) -> Result<Self> {
        let mut stack = Stack::new(
            STACK_ID,
            env.clone(),
            "Network: VPC, subnets, gateway endpoints and isolation groups",
        );

        let vpc = stack.add(
            "Vpc",
            &Vpc {
                cidr_block: config.vpc_cidr.clone(),
                enable_dns_hostnames: true,
                enable_dns_support: true,
                instance_tenancy: "default".to_string(),
                tags: vec![Tag::name(config.prefixed("vpc"))],
            },
        )?;

        let igw = stack.add(
            "InternetGateway",
            &InternetGateway {
                tags: vec![Tag::name(config.prefixed("igw"))],
            },
        )?;
        stack.add(
            "VpcGatewayAttachment",
            &VpcGatewayAttachment {
                vpc_id: vpc.clone(),
                internet_gateway_id: igw.clone(),
            },
        )?;

        let blocks = Ipv4Cidr::parse(&config.vpc_cidr)?.split(config.max_azs * 2)?;

        let mut public_subnets = Vec::new();
        let mut private_subnets = Vec::new();
        let mut private_route_tables = Vec::new();

        for (group_idx, group) in [SubnetGroup::Public, SubnetGroup::Private]
            .into_iter()
            .enumerate()
        {
            for az in 0..config.max_azs {
                let block = blocks[group_idx * config.max_azs + az];
                let subnet_id = format!("{}Subnet{}", group.label(), az + 1);
                let subnet_name = config.prefixed(&format!(
                    "{}-subnet",
                    group.label().to_lowercase()
                ));

                let subnet = stack.add(
                    &subnet_id,
                    &Subnet {
                        vpc_id: vpc.clone(),
                        cidr_block: block.to_string(),
                        availability_zone: Token::availability_zone(az),
                        map_public_ip_on_launch: matches!(group, SubnetGroup::Public),
                        tags: vec![Tag::name(subnet_name)],
                    },
                )?;

                let table_id = format!("{}RouteTable", subnet_id);
                let table = stack.add(
                    &table_id,
                    &RouteTable {
                        vpc_id: vpc.clone(),
                        tags: vec![Tag::name(format!("{}/{}", STACK_ID, subnet_id))],
                    },
                )?;
                stack.add(
                    &format!("{}RouteTableAssociation", subnet_id),
                    &SubnetRouteTableAssociation {
                        route_table_id: table.clone(),
                        subnet_id: subnet.clone(),
                    },
                )?;

                match group {
                    SubnetGroup::Public => {
                        let route_id = format!("{}DefaultRoute", subnet_id);
                        stack.add(
                            &route_id,
                            &Route {
                                route_table_id: table,
                                destination_cidr_block: "0.0.0.0/0".to_string(),
                                gateway_id: igw.clone(),
                            },
                        )?;
                        stack.depends_on(&route_id, "VpcGatewayAttachment")?;
                        public_subnets.push(subnet);
                    }
                    SubnetGroup::Private => {
                        private_route_tables.push(table);
                        private_subnets.push(subnet);
                    }
                }
            }
        }

        stack.add(
            "S3GatewayEndpoint",
            &VpcEndpoint::gateway(vpc.clone(), "s3", private_route_tables),
        )?;

        let edge = add_group(
            &mut stack,
            "EdgeSecurityGroup",
            &config.prefixed("edge-sg"),
            "Load balancer: public HTTP",
            &vpc,
            vec![IngressRule::tcp(
                config.listener_port,
                IngressSource::Cidr("0.0.0.0/0".to_string()),
                "HTTP from anywhere",
            )],
        )?;

        let compute = add_group(
            &mut stack,
            "ComputeSecurityGroup",
            &config.prefixed("compute-sg"),
            "Containers: traffic from the load balancer only",
            &vpc,
            vec![
                IngressRule::tcp(
                    config.listener_port,
                    IngressSource::SecurityGroup(edge.clone()),
                    "HTTP from load balancer",
                ),
                IngressRule::tcp(
                    config.container_port,
                    IngressSource::SecurityGroup(edge.clone()),
                    "Container port from load balancer",
                ),
            ],
        )?;

        let cache = add_group(
            &mut stack,
            "CacheSecurityGroup",
            &config.prefixed("cache-sg"),
            "Cache: Redis from containers",
            &vpc,
            vec![IngressRule::tcp(
                REDIS_PORT,
                IngressSource::SecurityGroup(compute.clone()),
                "Redis from containers",
            )],
        )?;

        let database = add_group(
            &mut stack,
            "DatabaseSecurityGroup",
            &config.prefixed("database-sg"),
            "Database: DocumentDB from containers",
            &vpc,
            vec![IngressRule::tcp(
                DOCDB_PORT,
                IngressSource::SecurityGroup(compute.clone()),
                "DocumentDB from containers",
            )],
        )?;

        let handles = NetworkHandles {
            vpc: stack.export("VpcId", vpc)?,
            public_subnets: export_all(&mut stack, "PublicSubnet", public_subnets)?,
            private_subnets: export_all(&mut stack, "PrivateSubnet", private_subnets)?,
            edge: stack.export("EdgeSecurityGroupId", edge)?,
            compute: stack.export("ComputeSecurityGroupId", compute)?,
            cache: stack.export("CacheSecurityGroupId", cache)?,
            database: stack.export("DatabaseSecurityGroupId", database)?,
        };

        Ok(Self { stack, handles })
    }
}

fn add_group(
    stack: &mut Stack,
    logical_id: &str,
    name: &str,
    description: &str,
    vpc: &Token,
    ingress: Vec<IngressRule>,
) -> Result<Token> {
    stack.add(
        logical_id,
        &SecurityGroup {
            group_name: name.to_string(),
            group_description: description.to_string(),
            vpc_id: vpc.clone(),
            security_group_ingress: ingress,
            security_group_egress: vec![EgressRule::allow_all()],
        },
    )?;
    Ok(Token::attr(logical_id, "GroupId"))
}

fn export_all(stack: &mut Stack, prefix: &str, tokens: Vec<Token>) -> Result<Vec<Handle>> {
    let mut handles = Vec::with_capacity(tokens.len());
    for (i, token) in tokens.into_iter().enumerate() {
        handles.push(stack.export(&format!("{}{}Id", prefix, i + 1), token)?);
    }
    Ok(handles)
}
