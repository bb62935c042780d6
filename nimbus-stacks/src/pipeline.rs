//! Pipeline unit: source → build → deploy
//!
//! The stage layout is kept as a [`PipelineSpec`] next to the rendered
//! resource so the same declaration can be executed locally.

use nimbus_core::resources::codepipeline::{ActionKind, ActionSpec, PipelineSpec, StageSpec};
use nimbus_core::resources::iam::{Policy, PolicyDocument, PolicyStatement, Role};
use nimbus_core::{Environment, Handle, Stack, Token};

use crate::build::BuildHandles;
use crate::config::TopologyConfig;
use crate::error::Result;
use crate::release::ReleaseHandles;

pub const STACK_ID: &str = "CodePipelineStack";

pub const SOURCE_ARTIFACT: &str = "SourceArtifact";
pub const BUILD_ARTIFACT: &str = "BuildArtifact";

const ROLE_ID: &str = "PipelineRole";

#[derive(Debug, Clone)]
pub struct PipelineHandles {
    pub pipeline_name: Handle,
    pub spec: PipelineSpec,
}

pub struct CodePipelineStack {
    pub stack: Stack,
    pub handles: PipelineHandles,
}

impl CodePipelineStack {
    pub fn build(
        env: &Environment,
        config: &TopologyConfig,
        build: &BuildHandles,
        release: &ReleaseHandles,
    ) -> Result<Self> {
        let mut stack = Stack::new(
            STACK_ID,
            env.clone(),
            "Pipeline: source, build and blue/green deploy",
        );

        let source_bucket = stack.import(&build.source.name);
        let source_arn = stack.import(&build.source.arn);
        let artifact_bucket = stack.import(&build.artifacts.name);
        let artifact_arn = stack.import(&build.artifacts.arn);
        let project = stack.import(&build.project_name);
        let project_arn = stack.import(&build.project_arn);
        let application = stack.import(&release.application_name);
        let deployment_group = stack.import(&release.deployment_group_name);

        let spec = PipelineSpec {
            name: config.service_scoped("pipeline"),
            stages: vec![
                StageSpec {
                    name: "Source".to_string(),
                    actions: vec![ActionSpec {
                        name: "S3Source".to_string(),
                        kind: ActionKind::S3Source {
                            bucket: source_bucket,
                            key: config.source_key.clone(),
                        },
                        inputs: Vec::new(),
                        outputs: vec![SOURCE_ARTIFACT.to_string()],
                    }],
                },
                StageSpec {
                    name: "Build".to_string(),
                    actions: vec![ActionSpec {
                        name: "CodeBuild".to_string(),
                        kind: ActionKind::CodeBuild { project },
                        inputs: vec![SOURCE_ARTIFACT.to_string()],
                        outputs: vec![BUILD_ARTIFACT.to_string()],
                    }],
                },
                StageSpec {
                    name: "Deploy".to_string(),
                    actions: vec![ActionSpec {
                        name: "Deploy".to_string(),
                        kind: ActionKind::CodeDeployEcs {
                            application,
                            deployment_group,
                        },
                        inputs: vec![BUILD_ARTIFACT.to_string()],
                        outputs: Vec::new(),
                    }],
                },
            ],
        };

        let role = stack.add(ROLE_ID, &Role::assumed_by("codepipeline.amazonaws.com"))?;

        let objects = |arn: &Token| Token::concat(vec![arn.clone(), "/*".into()]);
        stack.add(
            "PipelineRoleDefaultPolicy",
            &Policy {
                policy_name: "PipelineRoleDefaultPolicy".to_string(),
                policy_document: PolicyDocument::new(vec![
                    PolicyStatement::allow(
                        &[
                            "s3:GetObject",
                            "s3:GetObjectVersion",
                            "s3:GetBucketVersioning",
                            "s3:GetBucketLocation",
                            "s3:PutObject",
                        ],
                        vec![
                            source_arn.clone(),
                            objects(&source_arn),
                            artifact_arn.clone(),
                            objects(&artifact_arn),
                        ],
                    ),
                    PolicyStatement::allow(
                        &["codebuild:StartBuild", "codebuild:BatchGetBuilds"],
                        vec![project_arn],
                    ),
                    PolicyStatement::allow_all(&[
                        "codedeploy:CreateDeployment",
                        "codedeploy:GetApplication",
                        "codedeploy:GetApplicationRevision",
                        "codedeploy:GetDeployment",
                        "codedeploy:GetDeploymentConfig",
                        "codedeploy:RegisterApplicationRevision",
                    ]),
                    PolicyStatement::allow_all(&["ecs:RegisterTaskDefinition"]),
                    PolicyStatement::allow_all(&["iam:PassRole"]),
                ]),
                roles: vec![role],
            },
        )?;

        let pipeline = stack.add(
            "Pipeline",
            &spec.to_resource(Token::attr(ROLE_ID, "Arn"), artifact_bucket)?,
        )?;
        stack.depends_on("Pipeline", "PipelineRoleDefaultPolicy")?;

        let handles = PipelineHandles {
            pipeline_name: stack.export("PipelineName", pipeline)?,
            spec,
        };

        Ok(Self { stack, handles })
    }
}
