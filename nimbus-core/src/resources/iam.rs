//! Identities and permission sets

use serde::Serialize;

use super::ResourceProps;
use crate::token::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Effect {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Principal {
    pub service: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    pub effect: Effect,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<Principal>,

    pub action: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resource: Vec<Token>,
}

impl PolicyStatement {
    /// Allows `actions` on every resource
    pub fn allow_all(actions: &[&str]) -> Self {
        Self {
            effect: Effect::Allow,
            principal: None,
            action: actions.iter().map(|a| a.to_string()).collect(),
            resource: vec!["*".into()],
        }
    }

    /// Allows `actions` on the given resources
    pub fn allow(actions: &[&str], resource: Vec<Token>) -> Self {
        Self {
            effect: Effect::Allow,
            principal: None,
            action: actions.iter().map(|a| a.to_string()).collect(),
            resource,
        }
    }

    /// Trust statement letting a service assume the role
    pub fn assume_role(service: &str) -> Self {
        Self {
            effect: Effect::Allow,
            principal: Some(Principal {
                service: service.to_string(),
            }),
            action: vec!["sts:AssumeRole".to_string()],
            resource: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<PolicyStatement>,
}

impl PolicyDocument {
    pub fn new(statement: Vec<PolicyStatement>) -> Self {
        Self {
            version: "2012-10-17".to_string(),
            statement,
        }
    }
}

/// ARN of an AWS managed policy
pub fn managed_policy_arn(name: &str) -> Token {
    Token::concat(vec![
        "arn:".into(),
        Token::Partition,
        format!(":iam::aws:policy/{}", name).into(),
    ])
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Role {
    pub assume_role_policy_document: PolicyDocument,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub managed_policy_arns: Vec<Token>,
}

impl Role {
    /// Role assumable by one service principal
    pub fn assumed_by(service: &str) -> Self {
        Self {
            assume_role_policy_document: PolicyDocument::new(vec![PolicyStatement::assume_role(
                service,
            )]),
            role_name: None,
            description: None,
            managed_policy_arns: Vec::new(),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.role_name = Some(name.to_string());
        self
    }

    pub fn described(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_managed_policy(mut self, name: &str) -> Self {
        self.managed_policy_arns.push(managed_policy_arn(name));
        self
    }
}

impl ResourceProps for Role {
    const TYPE: &'static str = "AWS::IAM::Role";
}

/// Inline policy attached to one or more roles
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Policy {
    pub policy_name: String,
    pub policy_document: PolicyDocument,
    pub roles: Vec<Token>,
}

impl ResourceProps for Policy {
    const TYPE: &'static str = "AWS::IAM::Policy";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_trust_document() {
        let role = Role::assumed_by("codebuild.amazonaws.com");
        let value = serde_json::to_value(&role).unwrap();

        assert_eq!(
            value["AssumeRolePolicyDocument"],
            json!({
                "Version": "2012-10-17",
                "Statement": [{
                    "Effect": "Allow",
                    "Principal": { "Service": "codebuild.amazonaws.com" },
                    "Action": ["sts:AssumeRole"]
                }]
            })
        );
        assert!(value.get("ManagedPolicyArns").is_none());
    }

    #[test]
    fn test_managed_policy_arn_uses_partition() {
        let value = serde_json::to_value(managed_policy_arn("AmazonS3FullAccess")).unwrap();
        assert_eq!(
            value,
            json!({ "Fn::Join": ["", ["arn:", { "Ref": "AWS::Partition" }, ":iam::aws:policy/AmazonS3FullAccess"]] })
        );
    }
}
