// CloudFormation template model
//
// Every map is a BTreeMap so that serializing the same stack twice produces
// byte-identical output.

pub mod intrinsics;
mod logical_id;

pub use logical_id::LogicalId;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const FORMAT_VERSION: &str = "2010-09-09";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, Parameter>,

    #[serde(default)]
    pub resources: BTreeMap<String, Resource>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, Output>,
}

impl Template {
    pub fn new(description: Option<String>) -> Self {
        Self {
            format_version: FORMAT_VERSION.to_string(),
            description,
            parameters: BTreeMap::new(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
impl Template {
    /// All resources of the given CloudFormation type
    pub fn resources_of_type<'a>(
        &'a self,
        type_name: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a Resource)> + 'a {
        self.resources
            .iter()
            .filter(move |(_, resource)| resource.type_name == type_name)
    }

    pub fn count_of_type(&self, type_name: &str) -> usize {
        self.resources_of_type(type_name).count()
    }
}

#[cfg(test)]
impl Resource {
    /// Look up a top-level property
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

/// What CloudFormation does with the physical resource when it leaves the stack
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeletionPolicy {
    Delete,
    Retain,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Resource {
    #[serde(rename = "Type")]
    pub type_name: String,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub properties: Value,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<DeletionPolicy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<DeletionPolicy>,
}

impl Resource {
    pub fn new(type_name: &str, properties: Value) -> Self {
        Self {
            type_name: type_name.to_string(),
            properties,
            depends_on: Vec::new(),
            deletion_policy: None,
            update_replace_policy: None,
        }
    }

    /// Apply the same policy on deletion and on replacement
    pub fn with_removal_policy(mut self, policy: DeletionPolicy) -> Self {
        self.deletion_policy = Some(policy);
        self.update_replace_policy = Some(policy);
        self
    }

    pub fn depends_on(mut self, logical_id: &LogicalId) -> Self {
        let id = logical_id.as_str().to_string();
        if !self.depends_on.contains(&id) {
            self.depends_on.push(id);
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Parameter {
    #[serde(rename = "Type")]
    pub type_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    pub value: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export: Option<Export>,
}

impl Output {
    pub fn new(value: Value, description: &str) -> Self {
        Self {
            value,
            description: Some(description.to_string()),
            export: None,
        }
    }

    pub fn exported_as(mut self, name: impl Into<String>) -> Self {
        self.export = Some(Export { name: name.into() });
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Export {
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_template_serializes_in_cloudformation_shape() {
        let mut template = Template::new(Some("demo".to_string()));
        template.resources.insert(
            "Repo".to_string(),
            Resource::new("AWS::ECR::Repository", json!({"RepositoryName": "r"}))
                .with_removal_policy(DeletionPolicy::Retain),
        );
        template.outputs.insert(
            "RepositoryName".to_string(),
            Output::new(json!({"Ref": "Repo"}), "name").exported_as("RepoName"),
        );

        let value = serde_json::to_value(&template).unwrap();
        assert_eq!(value["AWSTemplateFormatVersion"], "2010-09-09");
        assert_eq!(value["Resources"]["Repo"]["Type"], "AWS::ECR::Repository");
        assert_eq!(value["Resources"]["Repo"]["DeletionPolicy"], "Retain");
        assert_eq!(value["Resources"]["Repo"]["UpdateReplacePolicy"], "Retain");
        assert!(value["Resources"]["Repo"].get("DependsOn").is_none());
        assert!(value.get("Parameters").is_none());
        assert_eq!(value["Outputs"]["RepositoryName"]["Export"]["Name"], "RepoName");
    }

    #[test]
    fn test_depends_on_is_deduplicated() {
        let id = LogicalId::from_path("Listener");
        let resource = Resource::new("AWS::ECS::Service", json!({}))
            .depends_on(&id)
            .depends_on(&id);
        assert_eq!(resource.depends_on, vec!["Listener".to_string()]);
    }

    #[test]
    fn test_template_parses_back_from_json() {
        let raw = r#"{
            "AWSTemplateFormatVersion": "2010-09-09",
            "Resources": {
                "Bucket": {"Type": "AWS::S3::Bucket", "DeletionPolicy": "Retain"}
            }
        }"#;
        let template: Template = serde_json::from_str(raw).unwrap();
        assert_eq!(template.count_of_type("AWS::S3::Bucket"), 1);
        assert_eq!(
            template.resources["Bucket"].deletion_policy,
            Some(DeletionPolicy::Retain)
        );
        assert!(template.resources["Bucket"].properties.is_null());
    }
}
