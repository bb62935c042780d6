//! Error types for topology assembly and synthesis

use nimbus_core::{CoreError, StackId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TopologyError>;

#[derive(Debug, Error)]
pub enum TopologyError {
    /// A declaration was rejected
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Configuration values are out of range
    #[error("Invalid topology configuration: {0}")]
    InvalidConfig(String),

    /// Stacks depend on each other in a loop
    #[error("Dependency cycle among stacks: {0}")]
    Cycle(String),

    /// A dependency names a stack that is not part of the topology
    #[error("Stack {stack} depends on unknown stack {missing}")]
    UnknownDependency { stack: StackId, missing: StackId },

    /// A stack imports a value no earlier dependency exports
    #[error("Stack {stack} imports '{export}' which none of its dependencies export")]
    UnresolvedImport { stack: StackId, export: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
