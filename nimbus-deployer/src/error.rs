//! Error types for deployments and releases

use std::time::Duration;

use nimbus_core::StackId;
use nimbus_stacks::TopologyError;
use thiserror::Error;

/// Result type alias for deployer operations
pub type Result<T> = std::result::Result<T, DeployError>;

#[derive(Debug, Error)]
pub enum DeployError {
    /// The control plane reported a failed or rolled back stack
    #[error("Stack {stack} failed: {reason}")]
    StackFailed { stack: StackId, reason: String },

    /// A stack imports a value no provisioned stack exports
    #[error("Stack {stack} imports '{export}' which is not exported by any deployed stack")]
    MissingExport { stack: StackId, export: String },

    /// Two stacks publish the same export name
    #[error("Export '{export}' of stack {stack} is already owned by {owner}")]
    DuplicateExport {
        export: String,
        stack: StackId,
        owner: StackId,
    },

    /// Stack did not reach a terminal status in time
    #[error("Stack {stack} did not settle within {waited:?}")]
    Timeout { stack: StackId, waited: Duration },

    /// A pipeline action could not complete
    #[error("Action '{action}' failed: {reason}")]
    ActionFailed { action: String, reason: String },

    /// A pipeline action is missing an input or declared output artifact
    #[error("Action '{action}' is missing artifact '{artifact}'")]
    MissingArtifact { action: String, artifact: String },

    /// The blue/green rollout did not complete
    #[error("Rollout failed: {0}")]
    RolloutFailed(String),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    /// AWS API error
    #[error("AWS error: {0}")]
    Aws(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeployError {
    pub fn action(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ActionFailed {
            action: action.into(),
            reason: reason.into(),
        }
    }

    /// Stack that caused the error, if any
    pub fn stack(&self) -> Option<&StackId> {
        match self {
            Self::StackFailed { stack, .. }
            | Self::MissingExport { stack, .. }
            | Self::DuplicateExport { stack, .. }
            | Self::Timeout { stack, .. } => Some(stack),
            _ => None,
        }
    }
}
