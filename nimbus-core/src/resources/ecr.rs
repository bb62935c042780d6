//! Image registry

use serde::Serialize;

use super::ResourceProps;
use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TagStatus {
    Tagged,
    Untagged,
    Any,
}

/// One rule of a repository lifecycle policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleRule {
    pub priority: u32,
    pub description: String,
    pub tag_status: TagStatus,
    pub max_image_age_days: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PolicyText<'a> {
    rules: Vec<RuleText<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RuleText<'a> {
    rule_priority: u32,
    description: &'a str,
    selection: Selection,
    action: ExpireAction,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Selection {
    tag_status: TagStatus,
    count_type: &'static str,
    count_unit: &'static str,
    count_number: u32,
}

#[derive(Serialize)]
struct ExpireAction {
    #[serde(rename = "type")]
    action_type: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LifecyclePolicy {
    pub lifecycle_policy_text: String,
}

impl LifecyclePolicy {
    /// Renders the rules into the JSON document ECR expects as a string
    pub fn from_rules(rules: &[LifecycleRule]) -> Result<Self> {
        let text = PolicyText {
            rules: rules
                .iter()
                .map(|rule| RuleText {
                    rule_priority: rule.priority,
                    description: &rule.description,
                    selection: Selection {
                        tag_status: rule.tag_status,
                        count_type: "sinceImagePushed",
                        count_unit: "days",
                        count_number: rule.max_image_age_days,
                    },
                    action: ExpireAction {
                        action_type: "expire",
                    },
                })
                .collect(),
        };

        let lifecycle_policy_text =
            serde_json::to_string(&text).map_err(|source| CoreError::Serialization {
                resource: "lifecycle policy".to_string(),
                source,
            })?;

        Ok(Self {
            lifecycle_policy_text,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Repository {
    pub repository_name: String,
    pub lifecycle_policy: LifecyclePolicy,
}

impl ResourceProps for Repository {
    const TYPE: &'static str = "AWS::ECR::Repository";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_policy_text() {
        let policy = LifecyclePolicy::from_rules(&[LifecycleRule {
            priority: 1,
            description: "Remove untagged images older than 10 days".to_string(),
            tag_status: TagStatus::Untagged,
            max_image_age_days: 10,
        }])
        .unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&policy.lifecycle_policy_text).unwrap();
        let rule = &parsed["rules"][0];
        assert_eq!(rule["rulePriority"], 1);
        assert_eq!(rule["selection"]["tagStatus"], "untagged");
        assert_eq!(rule["selection"]["countType"], "sinceImagePushed");
        assert_eq!(rule["selection"]["countNumber"], 10);
        assert_eq!(rule["action"]["type"], "expire");
    }
}
