use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::SynthError;
use crate::template::{intrinsics, LogicalId, Output, Parameter, Resource, Template};

/// Target account and region of a stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackEnv {
    pub account: Option<String>,
    pub region: String,
}

impl StackEnv {
    pub fn new(account: Option<String>, region: impl Into<String>) -> Self {
        Self {
            account,
            region: region.into(),
        }
    }

    /// Same account, different region
    pub fn in_region(&self, region: &str) -> Self {
        Self {
            account: self.account.clone(),
            region: region.to_string(),
        }
    }
}

/// A named, independently deployable unit of declared resources.
///
/// Constructs add resources under a construct path; the stack turns the path
/// into a logical id and refuses to register the same id twice.
#[derive(Debug, Clone)]
pub struct Stack {
    name: String,
    env: StackEnv,
    template: Template,
    dependencies: Vec<String>,
}

impl Stack {
    pub fn new(name: &str, env: StackEnv, description: &str) -> Self {
        Self {
            name: name.to_string(),
            env,
            template: Template::new(Some(description.to_string())),
            dependencies: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn env(&self) -> &StackEnv {
        &self.env
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Register a resource under a construct path and return its logical id
    pub fn add_resource(&mut self, path: &str, resource: Resource) -> Result<LogicalId, SynthError> {
        let logical_id = LogicalId::from_path(path);
        if self.template.resources.contains_key(logical_id.as_str()) {
            return Err(SynthError::DuplicateLogicalId {
                stack: self.name.clone(),
                path: path.to_string(),
                logical_id: logical_id.to_string(),
            });
        }

        debug!(
            stack = %self.name,
            logical_id = %logical_id,
            resource_type = %resource.type_name,
            "Declared resource"
        );
        self.template
            .resources
            .insert(logical_id.as_str().to_string(), resource);
        Ok(logical_id)
    }

    pub fn resource_mut(&mut self, logical_id: &str) -> Option<&mut Resource> {
        self.template.resources.get_mut(logical_id)
    }

    /// Declare a template parameter and return a `Ref` to it
    pub fn add_parameter(&mut self, name: &str, parameter: Parameter) -> Value {
        self.template.parameters.insert(name.to_string(), parameter);
        intrinsics::reference(name)
    }

    pub fn add_output(&mut self, name: &str, output: Output) {
        self.template.outputs.insert(name.to_string(), output);
    }

    /// Record that this stack must be deployed after `stack_name`
    pub fn add_dependency(&mut self, stack_name: &str) {
        if !self.dependencies.iter().any(|d| d == stack_name) {
            self.dependencies.push(stack_name.to_string());
        }
    }

    /// Construct path rendered the way CloudFormation descriptions show it
    pub fn path_of(&self, id: &str) -> String {
        format!("{}/{}", self.name, id)
    }
}

#[cfg(test)]
impl Stack {
    pub fn resource(&self, logical_id: &LogicalId) -> Option<&Resource> {
        self.template.resources.get(logical_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stack() -> Stack {
        Stack::new(
            "TestStack",
            StackEnv::new(None, "ap-northeast-1"),
            "test stack",
        )
    }

    #[test]
    fn test_add_resource_returns_logical_id() {
        let mut stack = stack();
        let id = stack
            .add_resource("Bucket", Resource::new("AWS::S3::Bucket", json!({})))
            .unwrap();
        assert_eq!(id.as_str(), "Bucket");
        assert!(stack.resource(&id).is_some());
    }

    #[test]
    fn test_duplicate_path_is_rejected() {
        let mut stack = stack();
        stack
            .add_resource("Bucket", Resource::new("AWS::S3::Bucket", json!({})))
            .unwrap();
        let err = stack
            .add_resource("Bucket", Resource::new("AWS::S3::Bucket", json!({})))
            .unwrap_err();
        assert!(matches!(err, SynthError::DuplicateLogicalId { .. }));
    }

    #[test]
    fn test_dependencies_are_unique() {
        let mut stack = stack();
        stack.add_dependency("BaseStack");
        stack.add_dependency("BaseStack");
        assert_eq!(stack.dependencies(), ["BaseStack".to_string()]);
    }

    #[test]
    fn test_env_in_region_keeps_account() {
        let env = StackEnv::new(Some("123456789012".to_string()), "ap-northeast-1");
        let edge = env.in_region("us-east-1");
        assert_eq!(edge.account.as_deref(), Some("123456789012"));
        assert_eq!(edge.region, "us-east-1");
    }
}
