//! Storage unit: pipeline source and artifact buckets

use nimbus_core::resources::s3::Bucket;
use nimbus_core::{Environment, Handle, RemovalPolicy, Stack, Token};

use crate::config::TopologyConfig;
use crate::error::Result;

pub const STACK_ID: &str = "S3Stack";

/// Name and ARN of one bucket
#[derive(Debug, Clone)]
pub struct BucketHandles {
    pub name: Handle,
    pub arn: Handle,
}

#[derive(Debug, Clone)]
pub struct StorageHandles {
    /// Holds the uploaded source bundle
    pub source: BucketHandles,
    /// Artifact hand-off between pipeline stages
    pub artifacts: BucketHandles,
}

pub struct S3Stack {
    pub stack: Stack,
    pub handles: StorageHandles,
}

impl S3Stack {
    pub fn build(env: &Environment, config: &TopologyConfig) -> Result<Self> {
        let mut stack = Stack::new(STACK_ID, env.clone(), "Storage: pipeline buckets");

        let source = add_bucket(
            &mut stack,
            "CicdBucket",
            Bucket::named(&config.prefixed("cicd"), true),
        )?;
        let artifacts = add_bucket(&mut stack, "ArtifactBucket", Bucket::generated(true))?;

        Ok(Self {
            stack,
            handles: StorageHandles { source, artifacts },
        })
    }
}

/// Deleted with the stack; must be emptied first since nothing auto-deletes objects
fn add_bucket(stack: &mut Stack, logical_id: &str, bucket: Bucket) -> Result<BucketHandles> {
    let name = stack.add_with_policy(logical_id, &bucket, RemovalPolicy::Destroy)?;

    Ok(BucketHandles {
        name: stack.export(&format!("{}Name", logical_id), name)?,
        arn: stack.export(
            &format!("{}Arn", logical_id),
            Token::attr(logical_id, "Arn"),
        )?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_are_versioned_and_destroyed() {
        let env = Environment::new("039612877479", "us-east-1").unwrap();
        let storage = S3Stack::build(&env, &TopologyConfig::default()).unwrap();
        let template = storage.stack.template();

        let source = template.resource("CicdBucket").unwrap();
        assert_eq!(source.properties["BucketName"], "nf-cicd");
        assert_eq!(source.properties["VersioningConfiguration"]["Status"], "Enabled");
        assert_eq!(source.deletion_policy.as_deref(), Some("Delete"));

        let artifacts = template.resource("ArtifactBucket").unwrap();
        assert!(artifacts.properties.get("BucketName").is_none());

        assert_eq!(template.exports().len(), 4);
        assert_eq!(
            storage.handles.source.name.export_name(),
            "S3Stack:CicdBucketName"
        );
    }
}
