//! Stack identity and cross-stack handles

use serde::{Deserialize, Serialize};

use crate::token::Token;

/// Stable stack name; the key deployments are reconciled by
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StackId(String);

impl StackId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StackId {
    fn from(name: &str) -> Self {
        StackId::new(name)
    }
}

/// Read-only reference to a value exported by another stack
///
/// A handle can only be created by the producing stack's `export`, and
/// consumers can only turn it into a token. Ownership of the underlying
/// resource stays with the producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handle {
    producer: StackId,
    local: Token,
    export_name: String,
}

impl Handle {
    pub(crate) fn new(producer: StackId, local: Token, export_name: String) -> Self {
        Self {
            producer,
            local,
            export_name,
        }
    }

    /// Stack that owns the referenced value
    pub fn producer(&self) -> &StackId {
        &self.producer
    }

    /// Name the value is exported under
    pub fn export_name(&self) -> &str {
        &self.export_name
    }

    /// Token as seen from inside the producing stack
    pub(crate) fn local(&self) -> &Token {
        &self.local
    }
}
