//! Log groups

use serde::Serialize;

use super::ResourceProps;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LogGroup {
    pub log_group_name: String,
    pub retention_in_days: u32,
}

impl ResourceProps for LogGroup {
    const TYPE: &'static str = "AWS::Logs::LogGroup";
}
