//! Managed build projects

use serde::Serialize;

use super::ResourceProps;
use crate::token::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ComputeType {
    #[serde(rename = "BUILD_GENERAL1_SMALL")]
    Small,
    #[serde(rename = "BUILD_GENERAL1_MEDIUM")]
    Medium,
    #[serde(rename = "BUILD_GENERAL1_LARGE")]
    Large,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EnvironmentVariable {
    pub name: String,
    #[serde(rename = "Type")]
    pub variable_type: String,
    pub value: Token,
}

impl EnvironmentVariable {
    pub fn plaintext(name: &str, value: Token) -> Self {
        Self {
            name: name.to_string(),
            variable_type: "PLAINTEXT".to_string(),
            value,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BuildEnvironment {
    #[serde(rename = "Type")]
    pub environment_type: String,
    pub image: String,
    pub compute_type: ComputeType,
    pub privileged_mode: bool,
    pub environment_variables: Vec<EnvironmentVariable>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Source {
    #[serde(rename = "Type")]
    pub source_type: String,
    pub location: Token,
    pub build_spec: String,
}

impl Source {
    /// Zip object `<bucket>/<key>`, buildspec path relative to its root
    pub fn s3(bucket: Token, key: &str, build_spec: &str) -> Self {
        Self {
            source_type: "S3".to_string(),
            location: Token::concat(vec![bucket, format!("/{}", key).into()]),
            build_spec: build_spec.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Artifacts {
    #[serde(rename = "Type")]
    pub artifacts_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Token>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub packaging: Option<String>,
}

impl Artifacts {
    /// Artifacts uploaded to `<bucket>/<build id>/<name>`
    pub fn s3(bucket: Token, name: &str, include_build_id: bool) -> Self {
        Self {
            artifacts_type: "S3".to_string(),
            location: Some(bucket),
            name: Some(name.to_string()),
            namespace_type: Some(if include_build_id { "BUILD_ID" } else { "NONE" }.to_string()),
            packaging: Some("NONE".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Project {
    pub name: String,
    pub service_role: Token,
    pub source: Source,
    pub artifacts: Artifacts,
    pub environment: BuildEnvironment,
}

impl ResourceProps for Project {
    const TYPE: &'static str = "AWS::CodeBuild::Project";
}
