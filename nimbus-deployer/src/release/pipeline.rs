//! Pipeline runner
//!
//! Executes a [`PipelineSpec`] stage by stage. Artifacts produced by one
//! stage are handed to later stages by name; the first failure stops the
//! run and every remaining stage is recorded as not run.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nimbus_core::resources::codepipeline::{ActionSpec, PipelineSpec};
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::{DeployError, Result};

/// Named bundle of files passed between stages
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub name: String,
    pub files: BTreeMap<String, String>,
}

impl Artifact {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            files: BTreeMap::new(),
        }
    }

    pub fn with_file(mut self, path: impl Into<String>, contents: impl Into<String>) -> Self {
        self.files.insert(path.into(), contents.into());
        self
    }

    pub fn file(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }
}

/// Runs a single pipeline action
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Execute `action` with its resolved input artifacts
    ///
    /// # Returns
    /// The artifacts the action produced. Every name in `action.outputs`
    /// must be present.
    async fn execute(&self, action: &ActionSpec, inputs: &[Artifact]) -> Result<Vec<Artifact>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StageStatus {
    Succeeded,
    Failed(String),
    NotRun,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub name: String,
    pub status: StageStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ExecutionStatus {
    Succeeded,
    Failed { stage: String, reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineExecution {
    pub id: Uuid,
    pub pipeline: String,
    pub status: ExecutionStatus,
    pub stages: Vec<StageRecord>,
    pub artifacts: BTreeMap<String, Artifact>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PipelineExecution {
    pub fn succeeded(&self) -> bool {
        self.status == ExecutionStatus::Succeeded
    }

    pub fn stage(&self, name: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.name == name)
    }
}

pub struct PipelineRunner {
    executor: Arc<dyn ActionExecutor>,
}

impl PipelineRunner {
    pub fn new(executor: Arc<dyn ActionExecutor>) -> Self {
        Self { executor }
    }

    /// Run every stage of `spec` in order
    pub async fn run(&self, spec: &PipelineSpec) -> PipelineExecution {
        let id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut artifacts: BTreeMap<String, Artifact> = BTreeMap::new();
        let mut stages = Vec::with_capacity(spec.stages.len());
        let mut failure: Option<(String, String)> = None;

        info!(execution = %id, pipeline = %spec.name, "Pipeline execution started");

        for stage in &spec.stages {
            if failure.is_some() {
                stages.push(StageRecord {
                    name: stage.name.clone(),
                    status: StageStatus::NotRun,
                    started_at: None,
                    finished_at: None,
                });
                continue;
            }

            let stage_started = Utc::now();
            info!(execution = %id, stage = %stage.name, "Stage started");

            let mut result = Ok(());
            for action in &stage.actions {
                result = self.run_action(action, &mut artifacts).await;
                if result.is_err() {
                    break;
                }
            }

            let status = match result {
                Ok(()) => {
                    info!(execution = %id, stage = %stage.name, "Stage succeeded");
                    StageStatus::Succeeded
                }
                Err(e) => {
                    error!(execution = %id, stage = %stage.name, error = %e, "Stage failed");
                    failure = Some((stage.name.clone(), e.to_string()));
                    StageStatus::Failed(e.to_string())
                }
            };

            stages.push(StageRecord {
                name: stage.name.clone(),
                status,
                started_at: Some(stage_started),
                finished_at: Some(Utc::now()),
            });
        }

        let status = match failure {
            None => ExecutionStatus::Succeeded,
            Some((stage, reason)) => ExecutionStatus::Failed { stage, reason },
        };

        info!(execution = %id, pipeline = %spec.name, status = ?status, "Pipeline execution finished");

        PipelineExecution {
            id,
            pipeline: spec.name.clone(),
            status,
            stages,
            artifacts,
            started_at,
            finished_at: Utc::now(),
        }
    }

    async fn run_action(
        &self,
        action: &ActionSpec,
        artifacts: &mut BTreeMap<String, Artifact>,
    ) -> Result<()> {
        let inputs = action
            .inputs
            .iter()
            .map(|name| {
                artifacts
                    .get(name)
                    .cloned()
                    .ok_or_else(|| DeployError::MissingArtifact {
                        action: action.name.clone(),
                        artifact: name.clone(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let produced = self.executor.execute(action, &inputs).await?;

        for output in &action.outputs {
            if !produced.iter().any(|a| &a.name == output) {
                return Err(DeployError::MissingArtifact {
                    action: action.name.clone(),
                    artifact: output.clone(),
                });
            }
        }

        for artifact in produced {
            artifacts.insert(artifact.name.clone(), artifact);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_core::resources::codepipeline::{ActionKind, StageSpec};
    use std::sync::Mutex;

    /// Echoes inputs into outputs and remembers what it saw
    #[derive(Default)]
    struct RecordingExecutor {
        fail: Option<String>,
        skip_outputs: bool,
        seen: Mutex<Vec<(String, Vec<String>)>>,
    }

    #[async_trait]
    impl ActionExecutor for RecordingExecutor {
        async fn execute(&self, action: &ActionSpec, inputs: &[Artifact]) -> Result<Vec<Artifact>> {
            self.seen.lock().unwrap().push((
                action.name.clone(),
                inputs.iter().map(|a| a.name.clone()).collect(),
            ));

            if self.fail.as_deref() == Some(action.name.as_str()) {
                return Err(DeployError::action(&action.name, "exit status 1"));
            }
            if self.skip_outputs {
                return Ok(Vec::new());
            }

            Ok(action
                .outputs
                .iter()
                .map(|name| Artifact::new(name).with_file("from", action.name.clone()))
                .collect())
        }
    }

    fn action(name: &str, inputs: &[&str], outputs: &[&str]) -> ActionSpec {
        ActionSpec {
            name: name.to_string(),
            kind: ActionKind::CodeBuild {
                project: "superman-build".into(),
            },
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn three_stages() -> PipelineSpec {
        PipelineSpec {
            name: "superman-pipeline".to_string(),
            stages: vec![
                StageSpec {
                    name: "Source".to_string(),
                    actions: vec![action("S3Source", &[], &["SourceArtifact"])],
                },
                StageSpec {
                    name: "Build".to_string(),
                    actions: vec![action("CodeBuild", &["SourceArtifact"], &["BuildArtifact"])],
                },
                StageSpec {
                    name: "Deploy".to_string(),
                    actions: vec![action("Deploy", &["BuildArtifact"], &[])],
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_stages_run_in_order_with_artifacts() {
        let executor = Arc::new(RecordingExecutor::default());
        let runner = PipelineRunner::new(executor.clone());

        let execution = runner.run(&three_stages()).await;

        assert!(execution.succeeded());
        assert_eq!(
            *executor.seen.lock().unwrap(),
            vec![
                ("S3Source".to_string(), vec![]),
                ("CodeBuild".to_string(), vec!["SourceArtifact".to_string()]),
                ("Deploy".to_string(), vec!["BuildArtifact".to_string()]),
            ]
        );
        assert_eq!(
            execution.artifacts["BuildArtifact"].file("from"),
            Some("CodeBuild")
        );
        assert!(execution
            .stages
            .iter()
            .all(|s| s.status == StageStatus::Succeeded));
    }

    #[tokio::test]
    async fn test_failure_stops_later_stages() {
        let executor = Arc::new(RecordingExecutor {
            fail: Some("CodeBuild".to_string()),
            ..Default::default()
        });
        let runner = PipelineRunner::new(executor.clone());

        let execution = runner.run(&three_stages()).await;

        assert!(!execution.succeeded());
        assert!(matches!(
            &execution.status,
            ExecutionStatus::Failed { stage, .. } if stage == "Build"
        ));
        assert_eq!(execution.stage("Source").unwrap().status, StageStatus::Succeeded);
        assert!(matches!(
            execution.stage("Build").unwrap().status,
            StageStatus::Failed(_)
        ));
        assert_eq!(execution.stage("Deploy").unwrap().status, StageStatus::NotRun);
        assert!(execution.stage("Deploy").unwrap().started_at.is_none());
        assert_eq!(executor.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_input_artifact() {
        let mut spec = three_stages();
        spec.stages[1].actions[0].inputs = vec!["Unknown".to_string()];
        let executor = Arc::new(RecordingExecutor::default());
        let runner = PipelineRunner::new(executor.clone());

        let execution = runner.run(&spec).await;

        match &execution.status {
            ExecutionStatus::Failed { stage, reason } => {
                assert_eq!(stage, "Build");
                assert!(reason.contains("Unknown"));
            }
            other => panic!("unexpected status {:?}", other),
        }
        // CodeBuild was never invoked
        assert_eq!(executor.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_declared_outputs_required() {
        let executor = Arc::new(RecordingExecutor {
            skip_outputs: true,
            ..Default::default()
        });
        let runner = PipelineRunner::new(executor);

        let execution = runner.run(&three_stages()).await;

        assert!(matches!(
            &execution.status,
            ExecutionStatus::Failed { stage, reason } if stage == "Source" && reason.contains("SourceArtifact")
        ));
        assert_eq!(execution.stage("Build").unwrap().status, StageStatus::NotRun);
    }
}
