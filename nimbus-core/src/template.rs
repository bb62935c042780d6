//! CloudFormation template model
//!
//! Maps are ordered so that rendering the same declarations always produces
//! byte-identical output.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{CoreError, Result};
use crate::token::Token;

/// What happens to a resource when it leaves the template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemovalPolicy {
    Retain,
    Destroy,
}

impl RemovalPolicy {
    fn as_cfn(&self) -> &'static str {
        match self {
            RemovalPolicy::Retain => "Retain",
            RemovalPolicy::Destroy => "Delete",
        }
    }
}

/// A single resource entry
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CfnResource {
    #[serde(rename = "Type")]
    pub resource_type: String,

    pub properties: serde_json::Value,

    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub depends_on: BTreeSet<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<String>,
}

impl CfnResource {
    pub fn new(resource_type: &str, properties: serde_json::Value) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            properties,
            depends_on: BTreeSet::new(),
            deletion_policy: None,
            update_replace_policy: None,
        }
    }

    pub fn with_removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.deletion_policy = Some(policy.as_cfn().to_string());
        self.update_replace_policy = Some(policy.as_cfn().to_string());
        self
    }
}

/// Export block of an output
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CfnExport {
    pub name: String,
}

/// A stack output, optionally exported for other stacks
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CfnOutput {
    pub value: Token,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub export: Option<CfnExport>,
}

/// A full template
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub resources: BTreeMap<String, CfnResource>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, CfnOutput>,
}

impl Template {
    pub fn new(description: Option<String>) -> Self {
        Self {
            format_version: "2010-09-09",
            description,
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Looks up a resource by logical id
    pub fn resource(&self, logical_id: &str) -> Option<&CfnResource> {
        self.resources.get(logical_id)
    }

    /// All resources of one CloudFormation type
    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a CfnResource)> + 'a {
        self.resources
            .iter()
            .filter(move |(_, r)| r.resource_type == resource_type)
    }

    /// Names of every export this template declares
    pub fn exports(&self) -> BTreeSet<String> {
        self.outputs
            .values()
            .filter_map(|o| o.export.as_ref().map(|e| e.name.clone()))
            .collect()
    }

    /// Names of every export this template imports
    pub fn imports(&self) -> Result<BTreeSet<String>> {
        let value = self.to_json()?;
        let mut imports = BTreeSet::new();
        collect_imports(&value, &mut imports);
        Ok(imports)
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|source| CoreError::Serialization {
            resource: "template".to_string(),
            source,
        })
    }

    pub fn to_pretty_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|source| CoreError::Serialization {
            resource: "template".to_string(),
            source,
        })
    }
}

/// Walks a rendered template collecting `Fn::ImportValue` names
pub fn collect_imports(value: &serde_json::Value, out: &mut BTreeSet<String>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, inner) in map {
                if key == "Fn::ImportValue" {
                    if let Some(name) = inner.as_str() {
                        out.insert(name.to_string());
                        continue;
                    }
                }
                collect_imports(inner, out);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_imports(item, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_removal_policy_sets_both_policies() {
        let resource = CfnResource::new("AWS::S3::Bucket", json!({}))
            .with_removal_policy(RemovalPolicy::Destroy);

        let value = serde_json::to_value(&resource).unwrap();
        assert_eq!(value["DeletionPolicy"], "Delete");
        assert_eq!(value["UpdateReplacePolicy"], "Delete");
        assert!(value.get("DependsOn").is_none());
    }

    #[test]
    fn test_collect_imports_walks_nested_values() {
        let value = json!({
            "Resources": {
                "A": { "Properties": { "Subnets": [
                    { "Fn::ImportValue": "NetworkStack:PublicSubnet0" },
                    { "Fn::ImportValue": "NetworkStack:PublicSubnet1" }
                ]}},
                "B": { "Properties": { "Name": { "Fn::Join": ["", [{ "Fn::ImportValue": "EcrStack:RepositoryName" }]] } } }
            }
        });

        let mut imports = BTreeSet::new();
        collect_imports(&value, &mut imports);
        assert_eq!(imports.len(), 3);
        assert!(imports.contains("EcrStack:RepositoryName"));
    }

    #[test]
    fn test_empty_outputs_are_omitted() {
        let template = Template::new(None);
        let value = template.to_json().unwrap();
        assert_eq!(value["AWSTemplateFormatVersion"], "2010-09-09");
        assert!(value.get("Outputs").is_none());
        assert!(value.get("Description").is_none());
    }
}
