//! Object storage

use serde::Serialize;

use super::ResourceProps;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct VersioningConfiguration {
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PublicAccessBlockConfiguration {
    pub block_public_acls: bool,
    pub block_public_policy: bool,
    pub ignore_public_acls: bool,
    pub restrict_public_buckets: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Bucket {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub versioning_configuration: Option<VersioningConfiguration>,

    pub public_access_block_configuration: PublicAccessBlockConfiguration,
}

impl Bucket {
    /// Private bucket with a fixed name
    pub fn named(name: &str, versioned: bool) -> Self {
        Self {
            bucket_name: Some(name.to_string()),
            ..Self::generated(versioned)
        }
    }

    /// Private bucket whose name CloudFormation generates
    pub fn generated(versioned: bool) -> Self {
        Self {
            bucket_name: None,
            versioning_configuration: versioned.then(|| VersioningConfiguration {
                status: "Enabled".to_string(),
            }),
            public_access_block_configuration: PublicAccessBlockConfiguration {
                block_public_acls: true,
                block_public_policy: true,
                ignore_public_acls: true,
                restrict_public_buckets: true,
            },
        }
    }
}

impl ResourceProps for Bucket {
    const TYPE: &'static str = "AWS::S3::Bucket";
}
