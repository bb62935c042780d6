//! Typed resource properties
//!
//! Each struct serializes to the `Properties` block of one CloudFormation
//! resource type. Field names follow the CloudFormation property names via
//! `rename_all = "PascalCase"`.

pub mod codebuild;
pub mod codedeploy;
pub mod codepipeline;
pub mod ec2;
pub mod ecr;
pub mod ecs;
pub mod elbv2;
pub mod iam;
pub mod logs;
pub mod s3;

use serde::Serialize;

/// Properties of a CloudFormation resource type
pub trait ResourceProps: Serialize {
    /// CloudFormation type name, e.g. `AWS::EC2::VPC`
    const TYPE: &'static str;
}

/// Resource tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn name(value: impl Into<String>) -> Self {
        Self {
            key: "Name".to_string(),
            value: value.into(),
        }
    }
}
