//! Nimbus Deployer
//!
//! Executes a [`Topology`](nimbus_stacks::Topology) against a control plane
//! and simulates the release path locally.
//!
//! Architecture:
//! - Control planes: where stacks are reconciled (in-memory or CloudFormation)
//! - Scheduler: wave-by-wave deployment with bounded concurrency
//! - Release: blue/green rollout controller and pipeline runner

pub mod config;
pub mod control_plane;
pub mod error;
pub mod release;
pub mod scheduler;

pub use config::{DeployerConfig, RolloutConfig};
pub use control_plane::{
    ChangeKind, CloudFormationControlPlane, ControlPlane, InMemoryControlPlane, StackDeployment,
    StackOutcome, StackRecord,
};
pub use error::{DeployError, Result};
pub use scheduler::{DeploymentReport, Deployer, StackReport, StackStatus};
