//! Error types for core declarations

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while declaring resources
#[derive(Debug, Error)]
pub enum CoreError {
    /// Account id is not a 12 digit string
    #[error("Invalid account id '{0}': expected 12 digits")]
    InvalidAccount(String),

    /// Region does not look like `us-east-1`
    #[error("Invalid region '{0}'")]
    InvalidRegion(String),

    /// CIDR block could not be parsed or split
    #[error("Invalid CIDR block '{block}': {reason}")]
    InvalidCidr { block: String, reason: String },

    /// Logical ids and export names must be alphanumeric
    #[error("Invalid name '{0}': only ASCII letters and digits are allowed")]
    InvalidName(String),

    /// A logical id was declared twice in one stack
    #[error("Duplicate logical id '{logical_id}' in stack {stack}")]
    DuplicateLogicalId { stack: String, logical_id: String },

    /// An export name was declared twice
    #[error("Duplicate export '{0}'")]
    DuplicateExport(String),

    /// Intra-stack dependency on an undeclared resource
    #[error("Resource '{0}' is not declared in stack {1}")]
    UnknownResource(String, String),

    /// Pipeline stages reference artifacts inconsistently
    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),

    /// Resource properties failed to serialize
    #[error("Failed to serialize properties of {resource}: {source}")]
    Serialization {
        resource: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CoreError {
    /// Create a CIDR error
    pub fn cidr(block: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidCidr {
            block: block.into(),
            reason: reason.into(),
        }
    }
}
