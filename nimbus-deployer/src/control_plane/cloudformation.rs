//! CloudFormation control plane
//!
//! Creates or updates stacks through the CloudFormation API and polls
//! `DescribeStacks` until they settle.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_cloudformation::Client;
use aws_sdk_cloudformation::error::DisplayErrorContext;
use aws_sdk_cloudformation::types::Capability;
use nimbus_core::{Environment, StackId};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{ChangeKind, ControlPlane, StackDeployment, StackOutcome, StackRecord};
use crate::config::DeployerConfig;
use crate::error::{DeployError, Result};

const NO_UPDATES: &str = "No updates are to be performed";
const DOES_NOT_EXIST: &str = "does not exist";

/// Settled or not, from a CloudFormation stack status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    InProgress,
    Complete,
    Failed,
}

/// Classifies a stack status string
///
/// Any rollback outcome counts as failed, even when the rollback itself
/// completed.
pub fn classify(status: &str) -> StatusClass {
    if status.ends_with("_IN_PROGRESS") {
        StatusClass::InProgress
    } else if status.ends_with("_FAILED") || status.contains("ROLLBACK") {
        StatusClass::Failed
    } else {
        StatusClass::Complete
    }
}

pub struct CloudFormationControlPlane {
    client: Client,
    poll_interval: Duration,
    stack_timeout: Duration,
}

impl CloudFormationControlPlane {
    /// Creates a client for the environment's region using the default
    /// credential chain
    pub async fn new(env: &Environment, config: &DeployerConfig) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(env.region.clone()))
            .load()
            .await;

        Self {
            client: Client::new(&sdk_config),
            poll_interval: config.poll_interval,
            stack_timeout: config.stack_timeout,
        }
    }

    async fn create(&self, deployment: &StackDeployment) -> Result<()> {
        info!(stack = %deployment.id, "Creating stack");

        self.client
            .create_stack()
            .stack_name(deployment.id.as_str())
            .template_body(&deployment.template_body)
            .capabilities(Capability::CapabilityNamedIam)
            .send()
            .await
            .map_err(|e| DeployError::Aws(format!("{}", DisplayErrorContext(&e))))?;

        Ok(())
    }

    /// Returns false when the template matches what is deployed
    async fn update(&self, deployment: &StackDeployment) -> Result<bool> {
        info!(stack = %deployment.id, "Updating stack");

        let result = self
            .client
            .update_stack()
            .stack_name(deployment.id.as_str())
            .template_body(&deployment.template_body)
            .capabilities(Capability::CapabilityNamedIam)
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) => {
                let message = format!("{}", DisplayErrorContext(&e));
                if message.contains(NO_UPDATES) {
                    debug!(stack = %deployment.id, "No changes to apply");
                    Ok(false)
                } else {
                    Err(DeployError::Aws(message))
                }
            }
        }
    }

    /// Polls until the stack leaves its in-progress status
    async fn wait_until_settled(&self, id: &StackId) -> Result<StackRecord> {
        let started = Instant::now();

        loop {
            let record = self.describe_stack(id).await?.ok_or_else(|| {
                DeployError::StackFailed {
                    stack: id.clone(),
                    reason: "stack disappeared while deploying".to_string(),
                }
            })?;

            match classify(&record.status) {
                StatusClass::Complete => return Ok(record),
                StatusClass::Failed => {
                    return Err(DeployError::StackFailed {
                        stack: id.clone(),
                        reason: record.status,
                    });
                }
                StatusClass::InProgress => {
                    if started.elapsed() >= self.stack_timeout {
                        return Err(DeployError::Timeout {
                            stack: id.clone(),
                            waited: started.elapsed(),
                        });
                    }
                    debug!(stack = %id, status = %record.status, "Waiting for stack");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }
}

#[async_trait]
impl ControlPlane for CloudFormationControlPlane {
    async fn deploy_stack(&self, deployment: &StackDeployment) -> Result<StackOutcome> {
        let change = match self.describe_stack(&deployment.id).await? {
            None => {
                self.create(deployment).await?;
                ChangeKind::Created
            }
            Some(record) if record.status == "ROLLBACK_COMPLETE" => {
                warn!(stack = %deployment.id, "Stack is in ROLLBACK_COMPLETE");
                return Err(DeployError::StackFailed {
                    stack: deployment.id.clone(),
                    reason: "previous creation rolled back; delete the stack before redeploying"
                        .to_string(),
                });
            }
            Some(_) => {
                if self.update(deployment).await? {
                    ChangeKind::Updated
                } else {
                    ChangeKind::Unchanged
                }
            }
        };

        let record = self.wait_until_settled(&deployment.id).await?;
        info!(stack = %deployment.id, change = %change, status = %record.status, "Stack settled");

        Ok(StackOutcome {
            change,
            exports: record.exports,
        })
    }

    async fn describe_stack(&self, name: &StackId) -> Result<Option<StackRecord>> {
        let result = self
            .client
            .describe_stacks()
            .stack_name(name.as_str())
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                let message = format!("{}", DisplayErrorContext(&e));
                if message.contains(DOES_NOT_EXIST) {
                    return Ok(None);
                }
                return Err(DeployError::Aws(message));
            }
        };

        let Some(stack) = output.stacks().first() else {
            return Ok(None);
        };

        let exports: BTreeMap<String, String> = stack
            .outputs()
            .iter()
            .filter_map(|o| Some((o.export_name()?.to_string(), o.output_value()?.to_string())))
            .collect();

        let last_updated = stack
            .last_updated_time()
            .or(stack.creation_time())
            .and_then(|t| chrono::DateTime::from_timestamp(t.secs(), 0));

        Ok(Some(StackRecord {
            name: name.clone(),
            status: stack
                .stack_status()
                .map(|s| s.as_str().to_string())
                .unwrap_or_default(),
            template_body: None,
            exports,
            last_updated,
        }))
    }
}
