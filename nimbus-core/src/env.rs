//! Deployment environment (account/region pair)

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// The account/region pair every stack of a topology is deployed into
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub account: String,
    pub region: String,
}

impl Environment {
    /// Creates a validated environment
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Result<Self> {
        let account = account.into();
        let region = region.into();

        if account.len() != 12 || !account.chars().all(|c| c.is_ascii_digit()) {
            return Err(CoreError::InvalidAccount(account));
        }

        if !is_valid_region(&region) {
            return Err(CoreError::InvalidRegion(region));
        }

        Ok(Self { account, region })
    }
}

/// `us-east-1`, `ap-southeast-2`, `us-gov-west-1`
fn is_valid_region(region: &str) -> bool {
    let parts: Vec<&str> = region.split('-').collect();
    if parts.len() < 3 {
        return false;
    }

    let (last, rest) = match parts.split_last() {
        Some(split) => split,
        None => return false,
    };

    !last.is_empty()
        && last.chars().all(|c| c.is_ascii_digit())
        && rest
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_lowercase()))
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "aws://{}/{}", self.account, self.region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_environment() {
        let env = Environment::new("039612877479", "us-east-1").unwrap();
        assert_eq!(env.to_string(), "aws://039612877479/us-east-1");
        assert!(Environment::new("039612877479", "us-gov-west-1").is_ok());
    }

    #[test]
    fn test_invalid_account() {
        assert!(matches!(
            Environment::new("1234", "us-east-1"),
            Err(CoreError::InvalidAccount(_))
        ));
        assert!(matches!(
            Environment::new("03961287747x", "us-east-1"),
            Err(CoreError::InvalidAccount(_))
        ));
    }

    #[test]
    fn test_invalid_region() {
        for region in ["", "us-east", "US-EAST-1", "us--1", "us-east-x"] {
            assert!(
                matches!(
                    Environment::new("039612877479", region),
                    Err(CoreError::InvalidRegion(_))
                ),
                "{region} should be rejected"
            );
        }
    }
}
