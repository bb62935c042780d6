//! In-memory control plane
//!
//! Keeps stack records and the export table in process. Export values are
//! resolved from the rendered template so downstream stacks, and the local
//! release simulation, see concrete names.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use nimbus_core::template::collect_imports;
use nimbus_core::{Environment, StackId};
use serde_json::Value;
use tracing::{debug, info};

use super::{ChangeKind, ControlPlane, StackDeployment, StackOutcome, StackRecord};
use crate::error::{DeployError, Result};

/// Properties that carry a resource's physical name, in lookup order
const NAME_PROPERTIES: [&str; 11] = [
    "BucketName",
    "RepositoryName",
    "ClusterName",
    "ServiceName",
    "ApplicationName",
    "DeploymentGroupName",
    "LogGroupName",
    "GroupName",
    "RoleName",
    "Family",
    "Name",
];

#[derive(Default)]
struct State {
    stacks: BTreeMap<StackId, StackRecord>,
    /// Export name → (owner, value)
    exports: BTreeMap<String, (StackId, String)>,
    failures: BTreeMap<StackId, String>,
    history: Vec<StackId>,
}

/// Control plane that provisions stacks into memory
#[derive(Default)]
pub struct InMemoryControlPlane {
    state: Mutex<State>,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl InMemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every deployment, so concurrent deployments overlap
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Makes every deployment of `stack` fail with `reason`
    pub fn fail_stack(&self, stack: impl Into<StackId>, reason: impl Into<String>) {
        let mut state = self.state.lock().unwrap();
        state.failures.insert(stack.into(), reason.into());
    }

    /// Export name → value for every provisioned stack
    pub fn exports(&self) -> BTreeMap<String, String> {
        let state = self.state.lock().unwrap();
        state
            .exports
            .iter()
            .map(|(name, (_, value))| (name.clone(), value.clone()))
            .collect()
    }

    /// Names of provisioned stacks
    pub fn stack_names(&self) -> Vec<StackId> {
        let state = self.state.lock().unwrap();
        state.stacks.keys().cloned().collect()
    }

    /// Stacks in the order their deployments were applied
    pub fn history(&self) -> Vec<StackId> {
        let state = self.state.lock().unwrap();
        state.history.clone()
    }

    /// Highest number of deployments observed running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn apply(&self, deployment: &StackDeployment) -> Result<StackOutcome> {
        let mut state = self.state.lock().unwrap();
        let id = &deployment.id;

        if let Some(reason) = state.failures.get(id) {
            return Err(DeployError::StackFailed {
                stack: id.clone(),
                reason: reason.clone(),
            });
        }

        let mut imports = BTreeSet::new();
        collect_imports(&deployment.template, &mut imports);
        for import in &imports {
            let resolvable = state
                .exports
                .get(import)
                .is_some_and(|(owner, _)| owner != id);
            if !resolvable {
                return Err(DeployError::MissingExport {
                    stack: id.clone(),
                    export: import.clone(),
                });
            }
        }

        let resolver = Resolver {
            stack: id,
            env: &deployment.env,
            template: &deployment.template,
            exports: &state.exports,
        };
        let exports = resolver.exports()?;

        for export in exports.keys() {
            if let Some((owner, _)) = state.exports.get(export) {
                if owner != id {
                    return Err(DeployError::DuplicateExport {
                        export: export.clone(),
                        stack: id.clone(),
                        owner: owner.clone(),
                    });
                }
            }
        }

        let change = match state.stacks.get(id) {
            None => ChangeKind::Created,
            Some(record) if record.template_body.as_deref() == Some(deployment.template_body.as_str()) => {
                ChangeKind::Unchanged
            }
            Some(_) => ChangeKind::Updated,
        };

        state.exports.retain(|_, (owner, _)| owner != id);
        for (name, value) in &exports {
            state
                .exports
                .insert(name.clone(), (id.clone(), value.clone()));
        }

        let status = match change {
            ChangeKind::Created => "CREATE_COMPLETE",
            ChangeKind::Updated | ChangeKind::Unchanged => "UPDATE_COMPLETE",
        };
        let previous_update = state.stacks.get(id).and_then(|r| r.last_updated);

        state.stacks.insert(
            id.clone(),
            StackRecord {
                name: id.clone(),
                status: status.to_string(),
                template_body: Some(deployment.template_body.clone()),
                exports: exports.clone(),
                last_updated: if change == ChangeKind::Unchanged {
                    previous_update
                } else {
                    Some(chrono::Utc::now())
                },
            },
        );
        state.history.push(id.clone());

        Ok(StackOutcome { change, exports })
    }
}

#[async_trait]
impl ControlPlane for InMemoryControlPlane {
    async fn deploy_stack(&self, deployment: &StackDeployment) -> Result<StackOutcome> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let result = self.apply(deployment);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match &result {
            Ok(outcome) => info!(
                stack = %deployment.id,
                change = %outcome.change,
                exports = outcome.exports.len(),
                "Stack reconciled in memory"
            ),
            Err(e) => debug!(stack = %deployment.id, error = %e, "In-memory deployment rejected"),
        }

        result
    }

    async fn describe_stack(&self, name: &StackId) -> Result<Option<StackRecord>> {
        let state = self.state.lock().unwrap();
        Ok(state.stacks.get(name).cloned())
    }
}

/// Resolves output values of one template to concrete strings
struct Resolver<'a> {
    stack: &'a StackId,
    env: &'a Environment,
    template: &'a Value,
    exports: &'a BTreeMap<String, (StackId, String)>,
}

impl Resolver<'_> {
    fn exports(&self) -> Result<BTreeMap<String, String>> {
        let mut resolved = BTreeMap::new();

        let Some(outputs) = self.template.get("Outputs").and_then(Value::as_object) else {
            return Ok(resolved);
        };

        for output in outputs.values() {
            let Some(name) = output.pointer("/Export/Name").and_then(Value::as_str) else {
                continue;
            };
            let value = output.get("Value").unwrap_or(&Value::Null);
            resolved.insert(name.to_string(), self.resolve(value)?);
        }

        Ok(resolved)
    }

    fn resolve(&self, value: &Value) -> Result<String> {
        match value {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Object(map) => {
                if let Some(target) = map.get("Ref").and_then(Value::as_str) {
                    return Ok(self.reference(target));
                }

                if let Some(args) = map.get("Fn::GetAtt").and_then(Value::as_array) {
                    let logical = args.first().and_then(Value::as_str).unwrap_or_default();
                    let attribute = args.get(1).and_then(Value::as_str).unwrap_or_default();
                    return Ok(self.attribute(logical, attribute));
                }

                if let Some(name) = map.get("Fn::ImportValue").and_then(Value::as_str) {
                    return self
                        .exports
                        .get(name)
                        .map(|(_, value)| value.clone())
                        .ok_or_else(|| DeployError::MissingExport {
                            stack: self.stack.clone(),
                            export: name.to_string(),
                        });
                }

                if let Some(args) = map.get("Fn::Join").and_then(Value::as_array) {
                    let separator = args.first().and_then(Value::as_str).unwrap_or_default();
                    let parts = args.get(1).and_then(Value::as_array).cloned().unwrap_or_default();
                    let parts = parts
                        .iter()
                        .map(|part| self.resolve(part))
                        .collect::<Result<Vec<_>>>()?;
                    return Ok(parts.join(separator));
                }

                if let Some(template) = map.get("Fn::Sub").and_then(Value::as_str) {
                    return Ok(self.substitute(template));
                }

                if let Some(args) = map.get("Fn::Select").and_then(Value::as_array) {
                    let index = args.first().and_then(Value::as_u64).unwrap_or_default();
                    return Ok(self.availability_zone(index));
                }

                Err(DeployError::Internal(format!(
                    "Cannot resolve output value {} in stack {}",
                    value, self.stack
                )))
            }
            other => Err(DeployError::Internal(format!(
                "Cannot resolve output value {} in stack {}",
                other, self.stack
            ))),
        }
    }

    /// Replaces every `${Name}` with what `Ref Name` resolves to
    fn substitute(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            match rest[start + 2..].find('}') {
                Some(len) => {
                    out.push_str(&self.reference(&rest[start + 2..start + 2 + len]));
                    rest = &rest[start + 3 + len..];
                }
                None => {
                    rest = &rest[start..];
                    break;
                }
            }
        }
        out.push_str(rest);
        out
    }

    fn reference(&self, target: &str) -> String {
        match target {
            "AWS::AccountId" => self.env.account.clone(),
            "AWS::Region" => self.env.region.clone(),
            "AWS::Partition" => "aws".to_string(),
            "AWS::URLSuffix" => "amazonaws.com".to_string(),
            logical => self
                .physical_name(logical)
                .unwrap_or_else(|| format!("{}-{}", self.stack, logical).to_lowercase()),
        }
    }

    fn attribute(&self, logical: &str, attribute: &str) -> String {
        match attribute {
            "Arn" => format!(
                "arn:aws:{}:{}:{}:{}",
                self.service(logical),
                self.env.region,
                self.env.account,
                self.reference(logical)
            ),
            _ => match self.physical_name(logical) {
                Some(name) if attribute.ends_with("Name") => name,
                _ => format!("{}-{}-{}", self.stack, logical, attribute).to_lowercase(),
            },
        }
    }

    /// ARN service segment from the resource type (`AWS::S3::Bucket` → `s3`)
    fn service(&self, logical: &str) -> String {
        let resource_type = self
            .template
            .pointer(&format!("/Resources/{}/Type", logical))
            .and_then(Value::as_str)
            .unwrap_or_default();

        match resource_type.split("::").nth(1) {
            Some("ElasticLoadBalancingV2") => "elasticloadbalancing".to_string(),
            Some(service) => service.to_lowercase(),
            None => "cloudformation".to_string(),
        }
    }

    fn availability_zone(&self, index: u64) -> String {
        let letter = (b'a' + (index % 26) as u8) as char;
        format!("{}{}", self.env.region, letter)
    }

    fn physical_name(&self, logical: &str) -> Option<String> {
        let properties = self
            .template
            .get("Resources")?
            .get(logical)?
            .get("Properties")?;

        NAME_PROPERTIES
            .iter()
            .find_map(|key| properties.get(*key).and_then(Value::as_str))
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_core::Stack;
    use nimbus_core::resources::s3::Bucket;

    fn env() -> Environment {
        Environment::new("039612877479", "us-east-1").unwrap()
    }

    fn storage() -> (Stack, nimbus_core::Handle) {
        let mut stack = Stack::new("S3Stack", env(), "storage");
        let bucket = stack.add("CicdBucket", &Bucket::named("nf-cicd", true)).unwrap();
        let handle = stack.export("CicdBucketName", bucket).unwrap();
        stack
            .export("CicdBucketArn", nimbus_core::Token::attr("CicdBucket", "Arn"))
            .unwrap();
        (stack, handle)
    }

    #[tokio::test]
    async fn test_create_then_unchanged_then_updated() {
        let plane = InMemoryControlPlane::new();
        let (mut stack, _) = storage();

        let first = plane
            .deploy_stack(&StackDeployment::from_stack(&stack).unwrap())
            .await
            .unwrap();
        assert_eq!(first.change, ChangeKind::Created);
        assert_eq!(first.exports["S3Stack:CicdBucketName"], "nf-cicd");
        assert_eq!(
            first.exports["S3Stack:CicdBucketArn"],
            "arn:aws:s3:us-east-1:039612877479:nf-cicd"
        );

        let second = plane
            .deploy_stack(&StackDeployment::from_stack(&stack).unwrap())
            .await
            .unwrap();
        assert_eq!(second.change, ChangeKind::Unchanged);

        stack.add("ArtifactBucket", &Bucket::generated(true)).unwrap();
        let third = plane
            .deploy_stack(&StackDeployment::from_stack(&stack).unwrap())
            .await
            .unwrap();
        assert_eq!(third.change, ChangeKind::Updated);

        // One record per name no matter how often it is deployed
        assert_eq!(plane.stack_names(), vec![StackId::new("S3Stack")]);
        assert_eq!(plane.history().len(), 3);
    }

    #[tokio::test]
    async fn test_import_requires_provisioned_export() {
        let plane = InMemoryControlPlane::new();
        let (producer, handle) = storage();

        let mut consumer = Stack::new("CodeBuildStack", env(), "consumer");
        let bucket = consumer.import(&handle);
        consumer.export("SourceBucketName", bucket).unwrap();

        let result = plane
            .deploy_stack(&StackDeployment::from_stack(&consumer).unwrap())
            .await;
        assert!(matches!(result, Err(DeployError::MissingExport { .. })));

        plane
            .deploy_stack(&StackDeployment::from_stack(&producer).unwrap())
            .await
            .unwrap();
        let outcome = plane
            .deploy_stack(&StackDeployment::from_stack(&consumer).unwrap())
            .await
            .unwrap();

        assert_eq!(outcome.exports["CodeBuildStack:SourceBucketName"], "nf-cicd");
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let plane = InMemoryControlPlane::new();
        plane.fail_stack("S3Stack", "bucket name taken");
        let (stack, _) = storage();

        let result = plane
            .deploy_stack(&StackDeployment::from_stack(&stack).unwrap())
            .await;

        match result {
            Err(DeployError::StackFailed { stack, reason }) => {
                assert_eq!(stack.as_str(), "S3Stack");
                assert_eq!(reason, "bucket name taken");
            }
            other => panic!("expected StackFailed, got {:?}", other),
        }
        assert!(plane.describe_stack(&StackId::new("S3Stack")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resolves_pseudo_parameters_and_attributes() {
        let plane = InMemoryControlPlane::new();
        let mut stack = Stack::new("EcrStack", env(), "registry");
        stack
            .export(
                "Registry",
                nimbus_core::Token::concat(vec![
                    nimbus_core::Token::AccountId,
                    ".dkr.ecr.".into(),
                    nimbus_core::Token::Region,
                ]),
            )
            .unwrap();
        stack
            .export("Zone", nimbus_core::Token::availability_zone(1))
            .unwrap();
        stack
            .export(
                "RepositoryUri",
                nimbus_core::Token::Sub(
                    "${AWS::AccountId}.dkr.ecr.${AWS::Region}.${AWS::URLSuffix}/superman".to_string(),
                ),
            )
            .unwrap();

        let outcome = plane
            .deploy_stack(&StackDeployment::from_stack(&stack).unwrap())
            .await
            .unwrap();

        assert_eq!(outcome.exports["EcrStack:Registry"], "039612877479.dkr.ecr.us-east-1");
        assert_eq!(outcome.exports["EcrStack:Zone"], "us-east-1b");
        assert_eq!(
            outcome.exports["EcrStack:RepositoryUri"],
            "039612877479.dkr.ecr.us-east-1.amazonaws.com/superman"
        );
    }
}
