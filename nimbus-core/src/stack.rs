//! Stack: a deployment unit owning a set of resource declarations
//!
//! A stack only ever adds resources to its own template. Values other stacks
//! need are published with [`Stack::export`], and values from other stacks
//! are consumed with [`Stack::import`], which records the dependency.

use std::collections::{BTreeMap, BTreeSet};

use crate::env::Environment;
use crate::error::{CoreError, Result};
use crate::handle::{Handle, StackId};
use crate::resources::ResourceProps;
use crate::template::{CfnExport, CfnOutput, CfnResource, RemovalPolicy, Template};
use crate::token::Token;

#[derive(Debug, Clone)]
pub struct Stack {
    id: StackId,
    env: Environment,
    template: Template,
    dependencies: BTreeSet<StackId>,
    exports: BTreeMap<String, Handle>,
}

impl Stack {
    pub fn new(id: impl Into<String>, env: Environment, description: impl Into<String>) -> Self {
        Self {
            id: StackId::new(id),
            env,
            template: Template::new(Some(description.into())),
            dependencies: BTreeSet::new(),
            exports: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &StackId {
        &self.id
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Stacks that must be deployed before this one
    pub fn dependencies(&self) -> &BTreeSet<StackId> {
        &self.dependencies
    }

    /// Handles this stack publishes, by output name
    pub fn exports(&self) -> &BTreeMap<String, Handle> {
        &self.exports
    }

    /// Declares a resource and returns a `Ref` to it
    pub fn add<R: ResourceProps>(&mut self, logical_id: &str, props: &R) -> Result<Token> {
        self.declare(logical_id, props, None)
    }

    /// Declares a resource with an explicit removal policy
    pub fn add_with_policy<R: ResourceProps>(
        &mut self,
        logical_id: &str,
        props: &R,
        policy: RemovalPolicy,
    ) -> Result<Token> {
        self.declare(logical_id, props, Some(policy))
    }

    fn declare<R: ResourceProps>(
        &mut self,
        logical_id: &str,
        props: &R,
        policy: Option<RemovalPolicy>,
    ) -> Result<Token> {
        validate_name(logical_id)?;

        if self.template.resources.contains_key(logical_id) {
            return Err(CoreError::DuplicateLogicalId {
                stack: self.id.to_string(),
                logical_id: logical_id.to_string(),
            });
        }

        let properties = serde_json::to_value(props).map_err(|source| CoreError::Serialization {
            resource: logical_id.to_string(),
            source,
        })?;

        let mut resource = CfnResource::new(R::TYPE, properties);
        if let Some(policy) = policy {
            resource = resource.with_removal_policy(policy);
        }

        self.template
            .resources
            .insert(logical_id.to_string(), resource);

        Ok(Token::reference(logical_id))
    }

    /// Orders two resources of this stack
    pub fn depends_on(&mut self, logical_id: &str, on: &str) -> Result<()> {
        if !self.template.resources.contains_key(on) {
            return Err(CoreError::UnknownResource(on.to_string(), self.id.to_string()));
        }

        let resource = self
            .template
            .resources
            .get_mut(logical_id)
            .ok_or_else(|| CoreError::UnknownResource(logical_id.to_string(), self.id.to_string()))?;

        resource.depends_on.insert(on.to_string());
        Ok(())
    }

    /// Publishes a value for other stacks under `<stack>:<name>`
    pub fn export(&mut self, name: &str, value: Token) -> Result<Handle> {
        validate_name(name)?;

        let export_name = format!("{}:{}", self.id, name);
        if self.template.outputs.contains_key(name) {
            return Err(CoreError::DuplicateExport(export_name));
        }

        self.template.outputs.insert(
            name.to_string(),
            CfnOutput {
                value: value.clone(),
                export: Some(CfnExport {
                    name: export_name.clone(),
                }),
            },
        );

        let handle = Handle::new(self.id.clone(), value, export_name);
        self.exports.insert(name.to_string(), handle.clone());
        Ok(handle)
    }

    /// Consumes a handle, recording the producer as a dependency
    pub fn import(&mut self, handle: &Handle) -> Token {
        if handle.producer() == &self.id {
            return handle.local().clone();
        }

        self.dependencies.insert(handle.producer().clone());
        Token::ImportValue(handle.export_name().to_string())
    }

    /// Records an ordering-only input: the producer must exist first even
    /// though no property of this stack renders the value
    pub fn require(&mut self, handle: &Handle) {
        if handle.producer() != &self.id {
            self.dependencies.insert(handle.producer().clone());
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(CoreError::InvalidName(name.to_string()));
    }
    Ok(())
}
