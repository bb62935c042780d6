//! Nimbus Stacks
//!
//! The eight deployment units of the `superman` service topology and the
//! machinery to order and synthesize them.
//!
//! Units, in declaration order:
//! - `NetworkStack`: VPC, subnets, isolation groups
//! - `EcrStack`: image registry
//! - `S3Stack`: pipeline source and artifact buckets
//! - `AlbStack`: load balancer, blue/green pools, listener
//! - `CodeBuildStack`: build project
//! - `EcsStack`: Fargate service
//! - `CodeDeployStack`: blue/green deployment group
//! - `CodePipelineStack`: source → build → deploy pipeline

pub mod balancer;
pub mod build;
pub mod compute;
pub mod config;
pub mod error;
pub mod network;
pub mod order;
pub mod pipeline;
pub mod registry;
pub mod release;
pub mod storage;
pub mod synth;
pub mod topology;

pub use config::TopologyConfig;
pub use error::{Result, TopologyError};
pub use synth::{Manifest, ManifestEntry, synth};
pub use topology::Topology;
