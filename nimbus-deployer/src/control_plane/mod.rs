//! Control planes
//!
//! A control plane reconciles one stack at a time, keyed by the stack's
//! stable name: deploying a name that already exists updates it in place
//! (or leaves it alone when the template is unchanged).

mod cloudformation;
mod memory;

pub use cloudformation::CloudFormationControlPlane;
pub use memory::InMemoryControlPlane;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nimbus_core::{Environment, Stack, StackId};
use serde::{Deserialize, Serialize};

use crate::error::{DeployError, Result};

/// A rendered stack ready to hand to a control plane
#[derive(Debug, Clone)]
pub struct StackDeployment {
    pub id: StackId,
    pub env: Environment,
    pub template: serde_json::Value,
    pub template_body: String,
}

impl StackDeployment {
    pub fn from_stack(stack: &Stack) -> Result<Self> {
        let template = stack
            .template()
            .to_json()
            .map_err(|e| DeployError::Internal(e.to_string()))?;
        let template_body = serde_json::to_string(&template)
            .map_err(|e| DeployError::Internal(e.to_string()))?;

        Ok(Self {
            id: stack.id().clone(),
            env: stack.env().clone(),
            template,
            template_body,
        })
    }
}

/// What a deployment did to the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Created,
    Updated,
    Unchanged,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ChangeKind::Created => "created",
            ChangeKind::Updated => "updated",
            ChangeKind::Unchanged => "unchanged",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackOutcome {
    pub change: ChangeKind,
    /// Export name → resolved value
    pub exports: BTreeMap<String, String>,
}

/// Current state of a deployed stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackRecord {
    pub name: StackId,
    pub status: String,
    pub template_body: Option<String>,
    pub exports: BTreeMap<String, String>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Where stacks get provisioned
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Creates or updates a stack and waits until it settles
    ///
    /// # Arguments
    /// * `deployment` - The rendered stack
    ///
    /// # Returns
    /// The change applied and the values the stack exports
    async fn deploy_stack(&self, deployment: &StackDeployment) -> Result<StackOutcome>;

    /// Looks up a stack by name; `None` if it was never deployed
    async fn describe_stack(&self, name: &StackId) -> Result<Option<StackRecord>>;
}
