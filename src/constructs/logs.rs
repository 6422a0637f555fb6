use serde_json::json;

use crate::error::SynthError;
use crate::stack::Stack;
use crate::template::{DeletionPolicy, LogicalId, Resource};

/// Retention periods used by the environments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionDays {
    OneMonth,
    ThreeMonths,
}

impl RetentionDays {
    pub fn days(self) -> u32 {
        match self {
            RetentionDays::OneMonth => 30,
            RetentionDays::ThreeMonths => 90,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogGroupProps {
    pub log_group_name: String,
    pub retention: RetentionDays,
    pub removal_policy: DeletionPolicy,
}

#[derive(Debug, Clone)]
pub struct LogGroup {
    pub id: LogicalId,
}

pub fn add_log_group(
    stack: &mut Stack,
    id: &str,
    props: &LogGroupProps,
) -> Result<LogGroup, SynthError> {
    let logical_id = stack.add_resource(
        &format!("{}/Resource", id),
        Resource::new(
            "AWS::Logs::LogGroup",
            json!({
                "LogGroupName": props.log_group_name,
                "RetentionInDays": props.retention.days(),
            }),
        )
        .with_removal_policy(props.removal_policy),
    )?;

    Ok(LogGroup { id: logical_id })
}
