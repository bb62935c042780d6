//! Release pipelines
//!
//! [`PipelineSpec`] is the declaration both the CloudFormation rendering and
//! the local pipeline runner work from.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::ResourceProps;
use crate::error::{CoreError, Result};
use crate::token::Token;

pub const APP_SPEC_PATH: &str = "appspec.yaml";
pub const TASK_DEFINITION_PATH: &str = "taskdef.json";

/// What an action does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    /// Fetch one object from a bucket
    S3Source { bucket: Token, key: String },
    /// Run a build project on the input artifact
    CodeBuild { project: Token },
    /// Blue/green ECS deployment from app spec + task definition templates
    CodeDeployEcs {
        application: Token,
        deployment_group: Token,
    },
}

impl ActionKind {
    pub fn category(&self) -> &'static str {
        match self {
            ActionKind::S3Source { .. } => "Source",
            ActionKind::CodeBuild { .. } => "Build",
            ActionKind::CodeDeployEcs { .. } => "Deploy",
        }
    }

    pub fn provider(&self) -> &'static str {
        match self {
            ActionKind::S3Source { .. } => "S3",
            ActionKind::CodeBuild { .. } => "CodeBuild",
            ActionKind::CodeDeployEcs { .. } => "CodeDeployToECS",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSpec {
    pub name: String,
    pub kind: ActionKind,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSpec {
    pub name: String,
    pub actions: Vec<ActionSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSpec {
    pub name: String,
    pub stages: Vec<StageSpec>,
}

impl PipelineSpec {
    /// Checks artifact wiring: every input was produced by an earlier stage
    /// and no artifact name is produced twice
    pub fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            return Err(CoreError::InvalidPipeline(format!(
                "pipeline '{}' has no stages",
                self.name
            )));
        }

        let mut produced: BTreeSet<&str> = BTreeSet::new();

        for stage in &self.stages {
            if stage.actions.is_empty() {
                return Err(CoreError::InvalidPipeline(format!(
                    "stage '{}' has no actions",
                    stage.name
                )));
            }

            let mut stage_outputs = Vec::new();
            for action in &stage.actions {
                for input in &action.inputs {
                    if !produced.contains(input.as_str()) {
                        return Err(CoreError::InvalidPipeline(format!(
                            "action '{}' consumes '{}' before any stage produces it",
                            action.name, input
                        )));
                    }
                }
                stage_outputs.extend(action.outputs.iter().map(String::as_str));
            }

            for output in stage_outputs {
                if !produced.insert(output) {
                    return Err(CoreError::InvalidPipeline(format!(
                        "artifact '{}' is produced more than once",
                        output
                    )));
                }
            }
        }

        Ok(())
    }

    /// Renders the pipeline resource
    pub fn to_resource(&self, role_arn: Token, artifact_bucket: Token) -> Result<Pipeline> {
        self.validate()?;

        Ok(Pipeline {
            name: self.name.clone(),
            role_arn,
            artifact_store: ArtifactStore {
                store_type: "S3".to_string(),
                location: artifact_bucket,
            },
            stages: self
                .stages
                .iter()
                .map(|stage| StageDeclaration {
                    name: stage.name.clone(),
                    actions: stage.actions.iter().map(render_action).collect(),
                })
                .collect(),
        })
    }
}

fn render_action(action: &ActionSpec) -> ActionDeclaration {
    let mut configuration: BTreeMap<String, Token> = BTreeMap::new();

    match &action.kind {
        ActionKind::S3Source { bucket, key } => {
            configuration.insert("S3Bucket".to_string(), bucket.clone());
            configuration.insert("S3ObjectKey".to_string(), key.as_str().into());
            configuration.insert("PollForSourceChanges".to_string(), "true".into());
        }
        ActionKind::CodeBuild { project } => {
            configuration.insert("ProjectName".to_string(), project.clone());
        }
        ActionKind::CodeDeployEcs {
            application,
            deployment_group,
        } => {
            let template_artifact = action.inputs.first().cloned().unwrap_or_default();
            configuration.insert("ApplicationName".to_string(), application.clone());
            configuration.insert("DeploymentGroupName".to_string(), deployment_group.clone());
            configuration.insert(
                "AppSpecTemplateArtifact".to_string(),
                template_artifact.as_str().into(),
            );
            configuration.insert("AppSpecTemplatePath".to_string(), APP_SPEC_PATH.into());
            configuration.insert(
                "TaskDefinitionTemplateArtifact".to_string(),
                template_artifact.into(),
            );
            configuration.insert(
                "TaskDefinitionTemplatePath".to_string(),
                TASK_DEFINITION_PATH.into(),
            );
        }
    }

    ActionDeclaration {
        name: action.name.clone(),
        action_type_id: ActionTypeId {
            category: action.kind.category().to_string(),
            owner: "AWS".to_string(),
            provider: action.kind.provider().to_string(),
            version: "1".to_string(),
        },
        configuration,
        input_artifacts: action
            .inputs
            .iter()
            .map(|name| ArtifactRef { name: name.clone() })
            .collect(),
        output_artifacts: action
            .outputs
            .iter()
            .map(|name| ArtifactRef { name: name.clone() })
            .collect(),
        run_order: 1,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ArtifactStore {
    #[serde(rename = "Type")]
    pub store_type: String,
    pub location: Token,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActionTypeId {
    pub category: String,
    pub owner: String,
    pub provider: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ArtifactRef {
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActionDeclaration {
    pub name: String,
    pub action_type_id: ActionTypeId,
    pub configuration: BTreeMap<String, Token>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub input_artifacts: Vec<ArtifactRef>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub output_artifacts: Vec<ArtifactRef>,

    pub run_order: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StageDeclaration {
    pub name: String,
    pub actions: Vec<ActionDeclaration>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Pipeline {
    pub name: String,
    pub role_arn: Token,
    pub artifact_store: ArtifactStore,
    pub stages: Vec<StageDeclaration>,
}

impl ResourceProps for Pipeline {
    const TYPE: &'static str = "AWS::CodePipeline::Pipeline";
}
