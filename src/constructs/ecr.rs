use serde_json::{json, Value};

use crate::error::SynthError;
use crate::stack::Stack;
use crate::template::intrinsics::{self, join, lit, reference};
use crate::template::{DeletionPolicy, LogicalId, Resource};

/// Name shared by the base stack (which owns the repository) and every
/// environment stack (which resolves it by name only)
pub const REPOSITORY_NAME: &str = "aws-pricing-calculator-merger";

/// Images kept by the repository lifecycle policy
pub const MAX_IMAGE_COUNT: u32 = 10;

#[derive(Debug, Clone)]
pub struct RepositoryProps {
    pub repository_name: String,
    pub image_scan_on_push: bool,
    pub max_image_count: u32,
    pub removal_policy: DeletionPolicy,
}

impl RepositoryProps {
    /// The shared application repository
    pub fn shared() -> Self {
        Self {
            repository_name: REPOSITORY_NAME.to_string(),
            image_scan_on_push: true,
            max_image_count: MAX_IMAGE_COUNT,
            removal_policy: DeletionPolicy::Retain,
        }
    }
}

/// Repository owned by the declaring stack
#[derive(Debug, Clone)]
pub struct Repository {
    pub id: LogicalId,
    pub name: String,
}

impl Repository {
    pub fn uri(&self) -> Value {
        self.id.attr("RepositoryUri")
    }
}

/// Lifecycle policy document expiring everything beyond the newest `max_image_count` images
pub fn lifecycle_policy_text(max_image_count: u32) -> Result<String, SynthError> {
    let policy = json!({
        "rules": [{
            "rulePriority": 1,
            "description": format!("Keep only the {} most recent images", max_image_count),
            "selection": {
                "tagStatus": "any",
                "countType": "imageCountMoreThan",
                "countNumber": max_image_count,
            },
            "action": { "type": "expire" },
        }]
    });
    Ok(serde_json::to_string(&policy)?)
}

pub fn add_repository(
    stack: &mut Stack,
    id: &str,
    props: &RepositoryProps,
) -> Result<Repository, SynthError> {
    let resource = Resource::new(
        "AWS::ECR::Repository",
        json!({
            "RepositoryName": props.repository_name,
            "ImageScanningConfiguration": { "ScanOnPush": props.image_scan_on_push },
            "LifecyclePolicy": {
                "LifecyclePolicyText": lifecycle_policy_text(props.max_image_count)?,
            },
        }),
    )
    .with_removal_policy(props.removal_policy);

    let logical_id = stack.add_resource(&format!("{}/Resource", id), resource)?;
    Ok(Repository {
        id: logical_id,
        name: props.repository_name.clone(),
    })
}

/// Repository referenced by name from a stack that does not own it.
///
/// No template resource is declared; the URI is assembled from the stack's
/// own account and region, so a wrong name only surfaces when ECS pulls.
#[derive(Debug, Clone)]
pub struct RepositoryRef {
    name: String,
}

impl RepositoryRef {
    pub fn from_name(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uri(&self) -> Value {
        join(
            "",
            vec![
                reference(intrinsics::ACCOUNT_ID),
                lit(".dkr.ecr."),
                reference(intrinsics::REGION),
                lit("."),
                reference(intrinsics::URL_SUFFIX),
                lit(&format!("/{}", self.name)),
            ],
        )
    }

    /// Image reference for a tag, e.g. `<uri>:latest`
    pub fn image(&self, tag: &str) -> Value {
        join("", vec![self.uri(), lit(&format!(":{}", tag))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::StackEnv;

    #[test]
    fn test_lifecycle_policy_keeps_ten_images() {
        let text = lifecycle_policy_text(MAX_IMAGE_COUNT).unwrap();
        let policy: Value = serde_json::from_str(&text).unwrap();
        let rule = &policy["rules"][0];
        assert_eq!(rule["selection"]["countType"], "imageCountMoreThan");
        assert_eq!(rule["selection"]["countNumber"], 10);
        assert_eq!(rule["action"]["type"], "expire");
    }

    #[test]
    fn test_add_repository_is_retained() {
        let mut stack = Stack::new("S", StackEnv::new(None, "ap-northeast-1"), "d");
        let repo = add_repository(&mut stack, "Repo", &RepositoryProps::shared()).unwrap();
        let resource = stack.resource(&repo.id).unwrap();
        assert_eq!(resource.deletion_policy, Some(DeletionPolicy::Retain));
        assert_eq!(
            resource.property("RepositoryName").unwrap(),
            "aws-pricing-calculator-merger"
        );
        assert_eq!(
            resource.properties["ImageScanningConfiguration"]["ScanOnPush"],
            true
        );
    }

    #[test]
    fn test_repository_ref_image_uses_latest_tag() {
        let image = RepositoryRef::from_name(REPOSITORY_NAME).image("latest");
        let rendered = image.to_string();
        assert!(rendered.contains("/aws-pricing-calculator-merger"));
        assert!(rendered.contains(":latest"));
        assert!(rendered.contains("AWS::AccountId"));
    }
}
