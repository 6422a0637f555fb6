use thiserror::Error;

/// Errors raised while turning stack definitions into templates.
///
/// These are detected before anything is written to disk or submitted to
/// CloudFormation, so a failing synthesis never leaves partial output behind.
#[derive(Error, Debug)]
pub enum SynthError {
    #[error("duplicate logical id '{logical_id}' in stack '{stack}' (construct path '{path}')")]
    DuplicateLogicalId {
        stack: String,
        path: String,
        logical_id: String,
    },

    #[error("invalid stage name '{0}': must match ^[a-z][a-z0-9-]{{0,10}}$")]
    InvalidStageName(String),

    #[error("invalid capacity bounds: {0}")]
    InvalidCapacity(String),

    #[error("invalid network layout: {0}")]
    InvalidNetwork(String),

    #[error("unsupported Fargate task size: {cpu} CPU units with {memory_mib} MiB")]
    InvalidTaskSize { cpu: u32, memory_mib: u32 },

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("invalid alarm '{alarm}': {reason}")]
    InvalidAlarm { alarm: String, reason: String },

    #[error("invalid web ACL '{acl}': {reason}")]
    InvalidWebAcl { acl: String, reason: String },

    #[error(
        "hosted zone '{zone}' is not in the lookup context. \
         Run 'cmi context lookup' or add it to the context file"
    )]
    MissingContext { zone: String },

    #[error("failed to serialize embedded document: {0}")]
    Serialization(#[from] serde_json::Error),
}
