//! Nimbus Core
//!
//! Core types and abstractions for the Nimbus deployment topology.
//!
//! This crate contains:
//! - Environment and stack identity
//! - Tokens and handles: how one stack refers to another stack's resources
//! - The CloudFormation template model and typed resource properties
//! - CIDR math used to lay out subnets

pub mod env;
pub mod error;
pub mod handle;
pub mod net;
pub mod resources;
pub mod stack;
pub mod template;
pub mod token;

pub use env::Environment;
pub use error::{CoreError, Result};
pub use handle::{Handle, StackId};
pub use stack::Stack;
pub use template::{RemovalPolicy, Template};
pub use token::Token;
