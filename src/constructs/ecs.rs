use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::error::SynthError;
use crate::stack::Stack;
use crate::template::intrinsics::{self, reference};
use crate::template::{LogicalId, Resource};

use super::elb::TargetGroup;
use super::iam::Role;
use super::logs::LogGroup;

#[derive(Debug, Clone)]
pub struct ClusterProps {
    pub cluster_name: String,
    pub container_insights: bool,
}

#[derive(Debug, Clone)]
pub struct Cluster {
    pub id: LogicalId,
}

pub fn add_cluster(stack: &mut Stack, id: &str, props: &ClusterProps) -> Result<Cluster, SynthError> {
    let logical_id = stack.add_resource(
        &format!("{}/Resource", id),
        Resource::new(
            "AWS::ECS::Cluster",
            json!({
                "ClusterName": props.cluster_name,
                "ClusterSettings": [{
                    "Name": "containerInsights",
                    "Value": if props.container_insights { "enabled" } else { "disabled" },
                }],
            }),
        ),
    )?;
    Ok(Cluster { id: logical_id })
}

/// Reject CPU/memory pairs Fargate does not offer
pub fn validate_task_size(cpu: u32, memory_mib: u32) -> Result<(), SynthError> {
    let allowed = match cpu {
        256 => matches!(memory_mib, 512 | 1024 | 2048),
        512 => (1024..=4096).contains(&memory_mib) && memory_mib % 1024 == 0,
        1024 => (2048..=8192).contains(&memory_mib) && memory_mib % 1024 == 0,
        2048 => (4096..=16384).contains(&memory_mib) && memory_mib % 1024 == 0,
        4096 => (8192..=30720).contains(&memory_mib) && memory_mib % 1024 == 0,
        _ => false,
    };
    if allowed {
        Ok(())
    } else {
        Err(SynthError::InvalidTaskSize { cpu, memory_mib })
    }
}

#[derive(Debug, Clone)]
pub struct ContainerHealthCheck {
    pub command: Vec<String>,
    pub interval_secs: u32,
    pub timeout_secs: u32,
    pub retries: u32,
    pub start_period_secs: u32,
}

impl ContainerHealthCheck {
    /// `CMD-SHELL <shell command>`
    pub fn shell(command: &str) -> Self {
        Self {
            command: vec!["CMD-SHELL".to_string(), command.to_string()],
            interval_secs: 30,
            timeout_secs: 5,
            retries: 3,
            start_period_secs: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContainerDefinition {
    pub name: String,
    pub image: Value,
    pub essential: bool,
    pub container_port: u16,
    pub log_group: LogGroup,
    pub stream_prefix: String,
    pub environment: BTreeMap<String, String>,
    pub health_check: Option<ContainerHealthCheck>,
}

impl ContainerDefinition {
    fn render(&self) -> Value {
        let environment: Vec<Value> = self
            .environment
            .iter()
            .map(|(name, value)| json!({ "Name": name, "Value": value }))
            .collect();

        let mut definition = json!({
            "Name": self.name,
            "Image": self.image,
            "Essential": self.essential,
            "PortMappings": [{ "ContainerPort": self.container_port, "Protocol": "tcp" }],
            "LogConfiguration": {
                "LogDriver": "awslogs",
                "Options": {
                    "awslogs-group": self.log_group.id.reference(),
                    "awslogs-stream-prefix": self.stream_prefix,
                    "awslogs-region": reference(intrinsics::REGION),
                },
            },
            "Environment": environment,
        });
        if let Some(check) = &self.health_check {
            definition["HealthCheck"] = json!({
                "Command": check.command,
                "Interval": check.interval_secs,
                "Timeout": check.timeout_secs,
                "Retries": check.retries,
                "StartPeriod": check.start_period_secs,
            });
        }
        definition
    }
}

#[derive(Debug, Clone)]
pub struct TaskDefinitionProps {
    pub family: String,
    pub cpu: u32,
    pub memory_mib: u32,
    pub execution_role: Role,
    pub task_role: Role,
    pub containers: Vec<ContainerDefinition>,
}

#[derive(Debug, Clone)]
pub struct TaskDefinition {
    pub id: LogicalId,
    pub family: String,
    containers: Vec<(String, u16)>,
}

impl TaskDefinition {
    /// First essential container, the one a load balancer targets by default
    pub fn default_container(&self) -> Option<(&str, u16)> {
        self.containers
            .first()
            .map(|(name, port)| (name.as_str(), *port))
    }
}

pub fn add_fargate_task_definition(
    stack: &mut Stack,
    id: &str,
    props: &TaskDefinitionProps,
) -> Result<TaskDefinition, SynthError> {
    validate_task_size(props.cpu, props.memory_mib)?;

    let definitions: Vec<Value> = props.containers.iter().map(ContainerDefinition::render).collect();
    let logical_id = stack.add_resource(
        &format!("{}/Resource", id),
        Resource::new(
            "AWS::ECS::TaskDefinition",
            json!({
                "Family": props.family,
                "Cpu": props.cpu.to_string(),
                "Memory": props.memory_mib.to_string(),
                "NetworkMode": "awsvpc",
                "RequiresCompatibilities": ["FARGATE"],
                "ExecutionRoleArn": props.execution_role.arn(),
                "TaskRoleArn": props.task_role.arn(),
                "ContainerDefinitions": definitions,
            }),
        ),
    )?;

    Ok(TaskDefinition {
        id: logical_id,
        family: props.family.clone(),
        containers: props
            .containers
            .iter()
            .filter(|c| c.essential)
            .map(|c| (c.name.clone(), c.container_port))
            .collect(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentControllerType {
    /// Rolling update managed by ECS
    Ecs,
}

impl DeploymentControllerType {
    fn as_str(self) -> &'static str {
        match self {
            DeploymentControllerType::Ecs => "ECS",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FargateServiceProps {
    pub service_name: String,
    pub desired_count: u32,
    pub assign_public_ip: bool,
    pub subnets: Vec<Value>,
    pub security_groups: Vec<Value>,
    pub health_check_grace_secs: u32,
    pub deployment_controller: Option<DeploymentControllerType>,
    /// `Some(rollback)` enables the deployment circuit breaker
    pub circuit_breaker: Option<bool>,
    pub target_group: Option<TargetGroup>,
    /// Listeners that must exist before the service registers targets
    pub listeners: Vec<LogicalId>,
}

#[derive(Debug, Clone)]
pub struct FargateService {
    pub id: LogicalId,
}

impl FargateService {
    /// Service name as resolved by CloudFormation
    pub fn service_name(&self) -> Value {
        self.id.attr("Name")
    }
}

pub fn add_fargate_service(
    stack: &mut Stack,
    id: &str,
    cluster: &Cluster,
    task_definition: &TaskDefinition,
    props: &FargateServiceProps,
) -> Result<FargateService, SynthError> {
    let mut deployment = json!({
        "MaximumPercent": 200,
        "MinimumHealthyPercent": 50,
    });
    if let Some(rollback) = props.circuit_breaker {
        deployment["DeploymentCircuitBreaker"] = json!({ "Enable": true, "Rollback": rollback });
    }

    let mut properties = json!({
        "ServiceName": props.service_name,
        "Cluster": cluster.id.reference(),
        "TaskDefinition": task_definition.id.reference(),
        "LaunchType": "FARGATE",
        "DesiredCount": props.desired_count,
        "DeploymentConfiguration": deployment,
        "EnableECSManagedTags": false,
        "NetworkConfiguration": {
            "AwsvpcConfiguration": {
                "AssignPublicIp": if props.assign_public_ip { "ENABLED" } else { "DISABLED" },
                "SecurityGroups": props.security_groups,
                "Subnets": props.subnets,
            },
        },
    });
    if let Some(controller) = props.deployment_controller {
        properties["DeploymentController"] = json!({ "Type": controller.as_str() });
    }

    if let Some(target_group) = &props.target_group {
        let (container_name, container_port) =
            task_definition.default_container().ok_or_else(|| {
                SynthError::InvalidNetwork(format!(
                    "task definition '{}' has no essential container to register",
                    task_definition.family
                ))
            })?;
        properties["LoadBalancers"] = json!([{
            "ContainerName": container_name,
            "ContainerPort": container_port,
            "TargetGroupArn": target_group.arn(),
        }]);
        properties["HealthCheckGracePeriodSeconds"] = json!(props.health_check_grace_secs);
    }

    let mut resource = Resource::new("AWS::ECS::Service", properties);
    for listener in &props.listeners {
        resource = resource.depends_on(listener);
    }

    let logical_id = stack.add_resource(&format!("{}/Service", id), resource)?;
    Ok(FargateService { id: logical_id })
}
