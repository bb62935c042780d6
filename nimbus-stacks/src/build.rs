//! Build unit: the managed build project that turns the source bundle into
//! an image and deployment artifacts

use nimbus_core::resources::codebuild::{
    Artifacts, BuildEnvironment, ComputeType, EnvironmentVariable, Project, Source,
};
use nimbus_core::resources::iam::{Policy, PolicyDocument, PolicyStatement, Role};
use nimbus_core::{Environment, Handle, Stack, Token};

use crate::config::TopologyConfig;
use crate::error::Result;
use crate::storage::{BucketHandles, StorageHandles};

pub const STACK_ID: &str = "CodeBuildStack";

const ROLE_ID: &str = "CodebuildRole";

const ECR_ACTIONS: [&str; 12] = [
    "ecr:UntagResource",
    "ecr:GetDownloadUrlForLayer",
    "ecr:BatchGetImage",
    "ecr:CompleteLayerUpload",
    "ecr:TagResource",
    "ecr:GetAuthorizationToken",
    "ecr:UploadLayerPart",
    "ecr:ListImages",
    "ecr:InitiateLayerUpload",
    "ecr:BatchCheckLayerAvailability",
    "ecr:GetRepositoryPolicy",
    "ecr:PutImage",
];

#[derive(Debug, Clone)]
pub struct BuildHandles {
    pub project_name: Handle,
    pub project_arn: Handle,
    /// Source bucket, republished for the pipeline
    pub source: BucketHandles,
    /// Artifact bucket, republished for the pipeline
    pub artifacts: BucketHandles,
}

pub struct CodeBuildStack {
    pub stack: Stack,
    pub handles: BuildHandles,
}

impl CodeBuildStack {
    pub fn build(
        env: &Environment,
        config: &TopologyConfig,
        storage: &StorageHandles,
    ) -> Result<Self> {
        let mut stack = Stack::new(STACK_ID, env.clone(), "Build: image build project");

        let source_bucket = stack.import(&storage.source.name);
        let artifact_bucket = stack.import(&storage.artifacts.name);

        let role = stack.add(
            ROLE_ID,
            &Role::assumed_by("codebuild.amazonaws.com")
                .described("Lets the build project push images and read secrets"),
        )?;

        let policies = [
            ("CodeBuildEcrPolicy", PolicyStatement::allow_all(&ECR_ACTIONS)),
            (
                "CodeBuildSecretManagerPolicy",
                PolicyStatement::allow_all(&["secretsmanager:GetSecretValue"]),
            ),
            ("CloudWatchLogsPolicy", PolicyStatement::allow_all(&["logs:*"])),
            ("s3Policy", PolicyStatement::allow_all(&["s3:*"])),
        ];

        let project_name = config.service_scoped("build");
        let project = stack.add(
            "Project",
            &Project {
                name: project_name,
                service_role: Token::attr(ROLE_ID, "Arn"),
                source: Source::s3(source_bucket.clone(), &config.source_key, &config.build_spec),
                artifacts: Artifacts::s3(artifact_bucket.clone(), &config.service, true),
                environment: BuildEnvironment {
                    environment_type: "LINUX_CONTAINER".to_string(),
                    image: config.build_image.clone(),
                    compute_type: ComputeType::Small,
                    // Docker builds need the daemon
                    privileged_mode: true,
                    environment_variables: vec![
                        EnvironmentVariable::plaintext("SERVICE_NAME", config.service.as_str().into()),
                        EnvironmentVariable::plaintext("ACCOUNT", Token::AccountId),
                        EnvironmentVariable::plaintext("REGION", Token::Region),
                        EnvironmentVariable::plaintext(
                            "REPOSITORY_URI",
                            Token::Sub(format!(
                                "${{AWS::AccountId}}.dkr.ecr.${{AWS::Region}}.${{AWS::URLSuffix}}/{}",
                                config.repository_name()
                            )),
                        ),
                    ],
                },
            },
        )?;

        for (policy_name, statement) in policies {
            stack.add(
                policy_name,
                &Policy {
                    policy_name: policy_name.to_string(),
                    policy_document: PolicyDocument::new(vec![statement]),
                    roles: vec![role.clone()],
                },
            )?;
            // The role must carry its permissions before the project uses it
            stack.depends_on("Project", policy_name)?;
        }

        let source_arn = stack.import(&storage.source.arn);
        let artifact_arn = stack.import(&storage.artifacts.arn);

        let handles = BuildHandles {
            project_name: stack.export("ProjectName", project)?,
            project_arn: stack.export("ProjectArn", Token::attr("Project", "Arn"))?,
            source: BucketHandles {
                name: stack.export("SourceBucketName", source_bucket)?,
                arn: stack.export("SourceBucketArn", source_arn)?,
            },
            artifacts: BucketHandles {
                name: stack.export("ArtifactBucketName", artifact_bucket)?,
                arn: stack.export("ArtifactBucketArn", artifact_arn)?,
            },
        };

        Ok(Self { stack, handles })
    }
}
