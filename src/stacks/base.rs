use serde_json::Value;

use crate::constructs::ecr::{add_repository, RepositoryProps};
use crate::error::SynthError;
use crate::stack::{Stack, StackEnv};
use crate::template::Output;

pub const BASE_STACK_NAME: &str = "CalculatorMergerBaseStack";

/// Shared container registry both environments pull from
pub fn base_stack(env: &StackEnv) -> Result<Stack, SynthError> {
    let mut stack = Stack::new(
        BASE_STACK_NAME,
        env.clone(),
        "Shared infrastructure for the AWS pricing calculator merger",
    );

    let repository = add_repository(
        &mut stack,
        "CalculatorMergerRepository",
        &RepositoryProps::shared(),
    )?;

    stack.add_output(
        "RepositoryName",
        Output::new(Value::String(repository.name.clone()), "ECR repository name")
            .exported_as("CalculatorMergerRepositoryName"),
    );
    stack.add_output(
        "RepositoryUri",
        Output::new(repository.uri(), "ECR repository URI")
            .exported_as("CalculatorMergerRepositoryUri"),
    );

    Ok(stack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::DeletionPolicy;

    #[test]
    fn test_base_stack_declares_only_the_registry() {
        let stack = base_stack(&StackEnv::new(None, "ap-northeast-1")).unwrap();
        let template = stack.template();
        assert_eq!(template.resources.len(), 1);

        let (_, repo) = template.resources_of_type("AWS::ECR::Repository").next().unwrap();
        assert_eq!(repo.deletion_policy, Some(DeletionPolicy::Retain));
        assert_eq!(repo.properties["ImageScanningConfiguration"]["ScanOnPush"], true);

        let policy: Value = serde_json::from_str(
            repo.properties["LifecyclePolicy"]["LifecyclePolicyText"]
                .as_str()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(policy["rules"][0]["selection"]["countNumber"], 10);
        assert_eq!(
            policy["rules"][0]["description"],
            "Keep only the 10 most recent images"
        );
    }

    #[test]
    fn test_base_stack_exports_repository() {
        let stack = base_stack(&StackEnv::new(None, "ap-northeast-1")).unwrap();
        let outputs = &stack.template().outputs;
        assert_eq!(
            outputs["RepositoryName"].value,
            Value::String("aws-pricing-calculator-merger".to_string())
        );
        assert_eq!(
            outputs["RepositoryUri"].export.as_ref().unwrap().name,
            "CalculatorMergerRepositoryUri"
        );
        assert!(stack.dependencies().is_empty());
    }
}
