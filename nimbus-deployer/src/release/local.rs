//! In-process pipeline actions
//!
//! Source reads from an in-memory bucket map, build stamps a new image
//! revision into the deploy templates, and deploy hands that revision to
//! the blue/green [`RolloutController`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use nimbus_core::Token;
use nimbus_core::resources::codepipeline::{
    APP_SPEC_PATH, ActionKind, ActionSpec, TASK_DEFINITION_PATH,
};
use serde_json::json;
use tracing::{debug, info};

use super::pipeline::{ActionExecutor, Artifact};
use super::rollout::{
    HealthProbe, HealthStatus, ProbePhase, PoolColor, Replica, RolloutController,
    RolloutOutcome, RolloutReport, TrafficState,
};
use crate::error::{DeployError, Result};

pub const IMAGE_DEFINITIONS_PATH: &str = "imagedefinitions.json";

pub struct LocalActions {
    /// Export name → value of every provisioned stack
    exports: BTreeMap<String, String>,
    buckets: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
    image_repository: String,
    container_name: String,
    container_port: u16,
    desired_count: usize,
    controller: RolloutController,
    probe: Arc<dyn HealthProbe>,
    traffic: tokio::sync::Mutex<TrafficState>,
    builds: AtomicUsize,
    rollouts: Mutex<Vec<RolloutReport>>,
}

impl LocalActions {
    /// # Arguments
    /// * `exports` - Exports the action configuration is resolved against
    /// * `traffic` - Current listener and pool registrations
    /// * `controller` - Controller used by the deploy action
    /// * `probe` - Health checks for candidate pools
    pub fn new(
        exports: BTreeMap<String, String>,
        traffic: TrafficState,
        controller: RolloutController,
        probe: Arc<dyn HealthProbe>,
    ) -> Self {
        Self {
            exports,
            buckets: Mutex::new(BTreeMap::new()),
            image_repository: "prod/superman".to_string(),
            container_name: "superman".to_string(),
            container_port: 8080,
            desired_count: 1,
            controller,
            probe,
            traffic: tokio::sync::Mutex::new(traffic),
            builds: AtomicUsize::new(0),
            rollouts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_image_repository(mut self, repository: impl Into<String>) -> Self {
        self.image_repository = repository.into();
        self
    }

    pub fn with_container(mut self, name: impl Into<String>, port: u16) -> Self {
        self.container_name = name.into();
        self.container_port = port;
        self
    }

    pub fn with_desired_count(mut self, count: usize) -> Self {
        self.desired_count = count;
        self
    }

    /// Upload an object to a local bucket
    pub fn put_object(&self, bucket: &str, key: &str, contents: impl Into<String>) {
        let mut buckets = self.buckets.lock().unwrap();
        buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), contents.into());
    }

    pub async fn traffic(&self) -> TrafficState {
        self.traffic.lock().await.clone()
    }

    pub fn rollouts(&self) -> Vec<RolloutReport> {
        self.rollouts.lock().unwrap().clone()
    }

    fn resolve(&self, action: &ActionSpec, token: &Token) -> Result<String> {
        match token {
            Token::Literal(value) => Ok(value.clone()),
            Token::ImportValue(name) => self.exports.get(name).cloned().ok_or_else(|| {
                DeployError::action(&action.name, format!("export '{}' is not available", name))
            }),
            other => Err(DeployError::action(
                &action.name,
                format!("cannot resolve {:?} outside CloudFormation", other),
            )),
        }
    }

    fn output_name<'a>(action: &'a ActionSpec) -> Result<&'a str> {
        action
            .outputs
            .first()
            .map(String::as_str)
            .ok_or_else(|| DeployError::action(&action.name, "action declares no output artifact"))
    }

    fn source(&self, action: &ActionSpec, bucket: &Token, key: &str) -> Result<Vec<Artifact>> {
        let bucket = self.resolve(action, bucket)?;
        let buckets = self.buckets.lock().unwrap();
        let contents = buckets
            .get(&bucket)
            .and_then(|objects| objects.get(key))
            .ok_or_else(|| {
                DeployError::action(&action.name, format!("s3://{}/{} does not exist", bucket, key))
            })?;

        debug!(action = %action.name, %bucket, %key, "Fetched source object");
        Ok(vec![
            Artifact::new(Self::output_name(action)?).with_file(key, contents.clone()),
        ])
    }

    fn build(&self, action: &ActionSpec, project: &Token, inputs: &[Artifact]) -> Result<Vec<Artifact>> {
        let project = self.resolve(action, project)?;
        let source = inputs.first().ok_or_else(|| DeployError::MissingArtifact {
            action: action.name.clone(),
            artifact: action.inputs.first().cloned().unwrap_or_default(),
        })?;
        if source.files.is_empty() {
            return Err(DeployError::action(&action.name, "source artifact is empty"));
        }

        let number = self.builds.fetch_add(1, Ordering::SeqCst) + 1;
        let revision = format!("build-{}", number);
        let image = format!("{}:{}", self.image_repository, revision);

        let image_definitions = json!([{ "name": self.container_name, "imageUri": image }]);
        let task_definition = json!({
            "family": format!("{}-td", self.container_name),
            "containerDefinitions": [{
                "name": self.container_name,
                "image": image,
                "portMappings": [{ "containerPort": self.container_port }],
            }],
        });
        let app_spec = format!(
            "version: 0.0\n\
             Resources:\n  \
               - TargetService:\n      \
                   Type: AWS::ECS::Service\n      \
                   Properties:\n        \
                     TaskDefinition: <TASK_DEFINITION>\n        \
                     LoadBalancerInfo:\n          \
                       ContainerName: \"{}\"\n          \
                       ContainerPort: {}\n",
            self.container_name, self.container_port
        );

        info!(action = %action.name, %project, %image, "Build produced image");
        Ok(vec![
            Artifact::new(Self::output_name(action)?)
                .with_file(IMAGE_DEFINITIONS_PATH, image_definitions.to_string())
                .with_file(TASK_DEFINITION_PATH, task_definition.to_string())
                .with_file(APP_SPEC_PATH, app_spec),
        ])
    }

    async fn deploy(
        &self,
        action: &ActionSpec,
        application: &Token,
        deployment_group: &Token,
        inputs: &[Artifact],
    ) -> Result<Vec<Artifact>> {
        let application = self.resolve(action, application)?;
        let deployment_group = self.resolve(action, deployment_group)?;
        let missing = |path: &str| DeployError::MissingArtifact {
            action: action.name.clone(),
            artifact: path.to_string(),
        };

        let templates = inputs.first().ok_or_else(|| missing(TASK_DEFINITION_PATH))?;
        if templates.file(APP_SPEC_PATH).is_none() {
            return Err(missing(APP_SPEC_PATH));
        }
        let task_definition = templates
            .file(TASK_DEFINITION_PATH)
            .ok_or_else(|| missing(TASK_DEFINITION_PATH))?;
        let revision = image_revision(task_definition)
            .ok_or_else(|| DeployError::action(&action.name, "task definition has no image"))?;

        info!(action = %action.name, %application, %deployment_group, %revision, "Starting blue/green deployment");

        let report = {
            let mut traffic = self.traffic.lock().await;
            self.controller
                .run(&mut traffic, &revision, self.desired_count, self.probe.as_ref())
                .await
        };
        let outcome = report.outcome.clone();
        self.rollouts.lock().unwrap().push(report);

        match outcome {
            RolloutOutcome::Succeeded => Ok(Vec::new()),
            RolloutOutcome::Failed(reason) => Err(DeployError::RolloutFailed(reason)),
            RolloutOutcome::RolledBack(reason) => Err(DeployError::RolloutFailed(format!(
                "rolled back: {}",
                reason
            ))),
        }
    }
}

#[async_trait]
impl ActionExecutor for LocalActions {
    async fn execute(&self, action: &ActionSpec, inputs: &[Artifact]) -> Result<Vec<Artifact>> {
        match &action.kind {
            ActionKind::S3Source { bucket, key } => self.source(action, bucket, key),
            ActionKind::CodeBuild { project } => self.build(action, project, inputs),
            ActionKind::CodeDeployEcs {
                application,
                deployment_group,
            } => {
                self.deploy(action, application, deployment_group, inputs)
                    .await
            }
        }
    }
}

/// Tag of the first container image in a task definition template
fn image_revision(task_definition: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(task_definition).ok()?;
    let image = value["containerDefinitions"][0]["image"].as_str()?;
    image.rsplit_once(':').map(|(_, tag)| tag.to_string())
}

/// Health probe with switchable failures
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedProbe {
    /// Candidate never becomes healthy
    pub fail_health: bool,
    /// Candidate fails once it serves traffic
    pub fail_after_cutover: bool,
}

#[async_trait]
impl HealthProbe for SimulatedProbe {
    async fn check(&self, pool: PoolColor, replicas: &[Replica], phase: ProbePhase) -> HealthStatus {
        if replicas.is_empty() {
            return HealthStatus::Unhealthy(format!("no replicas registered in {}", pool));
        }
        match phase {
            ProbePhase::PreCutover if self.fail_health => {
                HealthStatus::Unhealthy("target health check returned 503".to_string())
            }
            ProbePhase::Bake if self.fail_after_cutover => {
                HealthStatus::Unhealthy("5xx rate above threshold".to_string())
            }
            _ => HealthStatus::Healthy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RolloutConfig;
    use crate::control_plane::InMemoryControlPlane;
    use crate::release::pipeline::{ExecutionStatus, PipelineRunner, StageStatus};
    use crate::{DeployerConfig, Deployer};
    use nimbus_core::Environment;
    use nimbus_stacks::{Topology, TopologyConfig};

    async fn provisioned() -> (Topology, BTreeMap<String, String>) {
        let env = Environment::new("039612877479", "us-east-1").unwrap();
        let topology = Topology::build(&env, &TopologyConfig::default()).unwrap();
        let plane = Arc::new(InMemoryControlPlane::new());
        let deployer = Deployer::new(plane.clone(), &DeployerConfig::default());
        let report = deployer.deploy(&topology).await.unwrap();
        assert!(report.succeeded());
        (topology, plane.exports())
    }

    fn actions(exports: BTreeMap<String, String>, probe: SimulatedProbe) -> Arc<LocalActions> {
        let actions = LocalActions::new(
            exports,
            TrafficState::new("latest", 1),
            RolloutController::new(RolloutConfig::immediate()),
            Arc::new(probe),
        );
        actions.put_object("nf-cicd", "cicd.zip", "superman sources");
        Arc::new(actions)
    }

    #[tokio::test]
    async fn test_release_rolls_out_new_build() {
        let (topology, exports) = provisioned().await;
        let actions = actions(exports, SimulatedProbe::default());
        let runner = PipelineRunner::new(actions.clone());

        let execution = runner.run(topology.pipeline()).await;

        assert!(execution.succeeded(), "{:?}", execution.status);
        let traffic = actions.traffic().await;
        assert_eq!(traffic.production(), PoolColor::Green);
        assert_eq!(traffic.serving_revision(), Some("build-1"));
        let build = &execution.artifacts["BuildArtifact"];
        assert!(build.file(IMAGE_DEFINITIONS_PATH).unwrap().contains("prod/superman:build-1"));
        assert_eq!(actions.rollouts().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_source_object_fails_source_stage() {
        let (topology, exports) = provisioned().await;
        let actions = Arc::new(LocalActions::new(
            exports,
            TrafficState::new("latest", 1),
            RolloutController::new(RolloutConfig::immediate()),
            Arc::new(SimulatedProbe::default()),
        ));
        let runner = PipelineRunner::new(actions.clone());

        let execution = runner.run(topology.pipeline()).await;

        assert!(matches!(
            &execution.status,
            ExecutionStatus::Failed { stage, .. } if stage == "Source"
        ));
        assert_eq!(execution.stage("Build").unwrap().status, StageStatus::NotRun);
        assert!(actions.rollouts().is_empty());
    }

    #[tokio::test]
    async fn test_failed_rollout_fails_deploy_stage() {
        let (topology, exports) = provisioned().await;
        let actions = actions(
            exports,
            SimulatedProbe {
                fail_after_cutover: true,
                ..Default::default()
            },
        );
        let runner = PipelineRunner::new(actions.clone());

        let execution = runner.run(topology.pipeline()).await;

        assert!(matches!(
            &execution.status,
            ExecutionStatus::Failed { stage, reason } if stage == "Deploy" && reason.contains("rolled back")
        ));
        let traffic = actions.traffic().await;
        assert_eq!(traffic.production(), PoolColor::Blue);
        assert_eq!(traffic.serving_revision(), Some("latest"));
    }

    #[tokio::test]
    async fn test_unresolved_export_fails_action() {
        let (topology, _) = provisioned().await;
        let actions = actions(BTreeMap::new(), SimulatedProbe::default());
        let runner = PipelineRunner::new(actions);

        let execution = runner.run(topology.pipeline()).await;

        assert!(matches!(
            &execution.status,
            ExecutionStatus::Failed { stage, reason } if stage == "Source" && reason.contains("not available")
        ));
    }

    #[test]
    fn test_image_revision() {
        let taskdef = r#"{"containerDefinitions":[{"image":"superman:build-7"}]}"#;
        assert_eq!(image_revision(taskdef), Some("build-7".to_string()));
        assert_eq!(image_revision("{}"), None);
    }
}
