//! CloudFormation value tokens
//!
//! A token is a value that is only fully known once the template is deployed:
//! a literal, a reference to another resource, or an intrinsic function.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// A value rendered into a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Plain string value
    Literal(String),
    /// `{"Ref": id}`
    Ref(String),
    /// `{"Fn::GetAtt": [id, attribute]}`
    GetAtt(String, String),
    /// `{"Fn::ImportValue": export}`
    ImportValue(String),
    /// `{"Fn::Join": [separator, [parts]]}`
    Join(String, Vec<Token>),
    /// `{"Fn::Sub": template}` with `${AWS::...}` placeholders
    Sub(String),
    /// `{"Fn::Select": [index, list]}`
    Select(usize, Box<Token>),
    /// `{"Fn::GetAZs": ""}` for the stack's region
    AvailabilityZones,
    /// `AWS::AccountId` pseudo parameter
    AccountId,
    /// `AWS::Region` pseudo parameter
    Region,
    /// `AWS::Partition` pseudo parameter
    Partition,
    /// `AWS::URLSuffix` pseudo parameter
    UrlSuffix,
}

impl Token {
    /// Reference to a resource's primary identifier
    pub fn reference(logical_id: impl Into<String>) -> Self {
        Token::Ref(logical_id.into())
    }

    /// Attribute of a resource
    pub fn attr(logical_id: impl Into<String>, attribute: impl Into<String>) -> Self {
        Token::GetAtt(logical_id.into(), attribute.into())
    }

    /// Concatenation without separator
    pub fn concat(parts: Vec<Token>) -> Self {
        Token::Join(String::new(), parts)
    }

    /// The `index`-th availability zone of the stack's region
    pub fn availability_zone(index: usize) -> Self {
        Token::Select(index, Box::new(Token::AvailabilityZones))
    }

    /// Literal value, if this token is one
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Token::Literal(value) => Some(value),
            _ => None,
        }
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Token::Literal(value.to_string())
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Token::Literal(value)
    }
}

impl Serialize for Token {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Token::Literal(value) => serializer.serialize_str(value),
            Token::Ref(id) => single_entry(serializer, "Ref", id),
            Token::GetAtt(id, attribute) => single_entry(serializer, "Fn::GetAtt", &[id, attribute]),
            Token::ImportValue(name) => single_entry(serializer, "Fn::ImportValue", name),
            Token::Join(separator, parts) => {
                single_entry(serializer, "Fn::Join", &(separator, parts))
            }
            Token::Select(index, list) => {
                single_entry(serializer, "Fn::Select", &(index, list.as_ref()))
            }
            Token::Sub(template) => single_entry(serializer, "Fn::Sub", template),
            Token::AvailabilityZones => single_entry(serializer, "Fn::GetAZs", ""),
            Token::AccountId => single_entry(serializer, "Ref", "AWS::AccountId"),
            Token::Region => single_entry(serializer, "Ref", "AWS::Region"),
            Token::Partition => single_entry(serializer, "Ref", "AWS::Partition"),
            Token::UrlSuffix => single_entry(serializer, "Ref", "AWS::URLSuffix"),
        }
    }
}

fn single_entry<S, V>(serializer: S, key: &str, value: &V) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    V: Serialize + ?Sized,
{
    let mut map = serializer.serialize_map(Some(1))?;
    map.serialize_entry(key, value)?;
    map.end()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_intrinsics_render() {
        assert_eq!(
            serde_json::to_value(Token::reference("Vpc")).unwrap(),
            json!({ "Ref": "Vpc" })
        );
        assert_eq!(
            serde_json::to_value(Token::attr("Alb", "DNSName")).unwrap(),
            json!({ "Fn::GetAtt": ["Alb", "DNSName"] })
        );
        assert_eq!(
            serde_json::to_value(Token::availability_zone(1)).unwrap(),
            json!({ "Fn::Select": [1, { "Fn::GetAZs": "" }] })
        );
    }

    #[test]
    fn test_join_renders_nested_tokens() {
        let token = Token::concat(vec![
            Token::AccountId,
            ".dkr.ecr.".into(),
            Token::Region,
        ]);

        assert_eq!(
            serde_json::to_value(token).unwrap(),
            json!({ "Fn::Join": ["", [{ "Ref": "AWS::AccountId" }, ".dkr.ecr.", { "Ref": "AWS::Region" }]] })
        );
    }

    #[test]
    fn test_sub_renders_template() {
        let token = Token::Sub("${AWS::AccountId}.dkr.ecr.${AWS::Region}".to_string());

        assert_eq!(
            serde_json::to_value(token).unwrap(),
            json!({ "Fn::Sub": "${AWS::AccountId}.dkr.ecr.${AWS::Region}" })
        );
    }
}
