use serde_json::{json, Value};

use crate::error::SynthError;
use crate::stack::Stack;
use crate::template::intrinsics::managed_policy_arn;
use crate::template::{LogicalId, Resource};

pub const ECS_TASKS_PRINCIPAL: &str = "ecs-tasks.amazonaws.com";
pub const ECS_TASK_EXECUTION_POLICY: &str = "service-role/AmazonECSTaskExecutionRolePolicy";

#[derive(Debug, Clone)]
pub struct RoleProps {
    /// Service principal allowed to assume the role
    pub assumed_by: String,
    /// AWS managed policy names, e.g. `service-role/AmazonECSTaskExecutionRolePolicy`
    pub managed_policies: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Role {
    pub id: LogicalId,
}

impl Role {
    pub fn arn(&self) -> Value {
        self.id.attr("Arn")
    }
}

fn assume_role_policy(service: &str) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Action": "sts:AssumeRole",
            "Effect": "Allow",
            "Principal": { "Service": service },
        }],
    })
}

pub fn add_role(stack: &mut Stack, id: &str, props: &RoleProps) -> Result<Role, SynthError> {
    let mut properties = json!({
        "AssumeRolePolicyDocument": assume_role_policy(&props.assumed_by),
    });
    if !props.managed_policies.is_empty() {
        properties["ManagedPolicyArns"] = Value::Array(
            props
                .managed_policies
                .iter()
                .map(|name| managed_policy_arn(name))
                .collect(),
        );
    }

    let id = stack.add_resource(
        &format!("{}/Resource", id),
        Resource::new("AWS::IAM::Role", properties),
    )?;
    Ok(Role { id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::StackEnv;

    #[test]
    fn test_execution_role_trusts_ecs_tasks() {
        let mut stack = Stack::new("S", StackEnv::new(None, "ap-northeast-1"), "d");
        let role = add_role(
            &mut stack,
            "TaskExecutionRole",
            &RoleProps {
                assumed_by: ECS_TASKS_PRINCIPAL.to_string(),
                managed_policies: vec![ECS_TASK_EXECUTION_POLICY.to_string()],
            },
        )
        .unwrap();

        let resource = stack.resource(&role.id).unwrap();
        assert_eq!(
            resource.properties["AssumeRolePolicyDocument"]["Statement"][0]["Principal"]
                ["Service"],
            "ecs-tasks.amazonaws.com"
        );
        assert_eq!(
            resource.properties["ManagedPolicyArns"]
                .as_array()
                .map(Vec::len),
            Some(1)
        );
    }

    #[test]
    fn test_task_role_has_no_managed_policies() {
        let mut stack = Stack::new("S", StackEnv::new(None, "ap-northeast-1"), "d");
        let role = add_role(
            &mut stack,
            "TaskRole",
            &RoleProps {
                assumed_by: ECS_TASKS_PRINCIPAL.to_string(),
                managed_policies: Vec::new(),
            },
        )
        .unwrap();
        assert!(stack
            .resource(&role.id)
            .unwrap()
            .property("ManagedPolicyArns")
            .is_none());
    }
}
