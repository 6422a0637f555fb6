use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use crate::constructs::autoscaling::{
    add_scalable_target, add_target_tracking_policy, CapacityPlan, TargetTrackingProps,
    TrackedMetric,
};
use crate::constructs::cloudwatch::{add_alarm, AlarmProps, Metric};
use crate::constructs::ecr::{RepositoryRef, REPOSITORY_NAME};
use crate::constructs::ecs::{
    add_cluster, add_fargate_service, add_fargate_task_definition, Cluster, ClusterProps,
    ContainerDefinition, ContainerHealthCheck, DeploymentControllerType, FargateService,
    FargateServiceProps, TaskDefinition, TaskDefinitionProps,
};
use crate::constructs::elb::{
    add_load_balancer, add_target_group, HealthCheck, LoadBalancer, LoadBalancerProps,
    TargetGroup, TargetGroupProps,
};
use crate::constructs::iam::{add_role, RoleProps, ECS_TASKS_PRINCIPAL, ECS_TASK_EXECUTION_POLICY};
use crate::constructs::logs::{add_log_group, LogGroupProps, RetentionDays};
use crate::constructs::network::{add_vpc, Vpc, VpcProps, DEFAULT_VPC_CIDR};
use crate::constructs::security_group::{
    add_ingress_rule, add_security_group, IngressRule, Peer, SecurityGroup, SecurityGroupProps,
};
use crate::error::SynthError;
use crate::stack::Stack;
use crate::template::{DeletionPolicy, LogicalId, Output};

use super::{export_name, validate_stage};

pub const CONTAINER_NAME: &str = "aws-calculator-merger-container";
pub const CONTAINER_PORT: u16 = 5000;
pub const STREAM_PREFIX: &str = "calculator-merger";
pub const IMAGE_TAG: &str = "latest";

/// Port the load balancer talks to its targets on
const TARGET_PORT: u16 = 80;

const ALARM_EVALUATION_PERIODS: u32 = 3;
const ALARM_DATAPOINTS: u32 = 2;

/// `production` for the prod stage, `development` for everything else
pub fn flask_env(stage: &str) -> &'static str {
    if stage == "prod" {
        "production"
    } else {
        "development"
    }
}

/// Sizing and retention of one environment's shared infrastructure
#[derive(Debug, Clone)]
pub struct EnvironmentProfile {
    pub stage: String,
    pub max_azs: usize,
    pub nat_gateways: usize,
    pub cpu: u32,
    pub memory_mib: u32,
    pub flask_env: String,
    pub log_retention: RetentionDays,
    pub log_removal_policy: DeletionPolicy,
    pub container_health_check: Option<ContainerHealthCheck>,
    pub lb_idle_timeout_secs: Option<u32>,
    /// Ports opened to the internet on the load balancer security group
    pub public_ports: Vec<(u16, &'static str)>,
}

#[derive(Debug, Clone)]
pub struct CpuScaling {
    pub target_percent: u32,
    pub scale_in_cooldown_secs: u32,
    pub scale_out_cooldown_secs: u32,
}

/// How the service behind the load balancer runs and scales
#[derive(Debug, Clone)]
pub struct ServiceProfile {
    pub desired_count: u32,
    pub health_check_grace_secs: u32,
    pub deployment_controller: Option<DeploymentControllerType>,
    pub circuit_breaker_rollback: Option<bool>,
    pub capacity: CapacityPlan,
    pub cpu_scaling: CpuScaling,
    pub requests_per_target: u32,
}

#[derive(Debug, Clone, Copy)]
pub enum WatchedMetric {
    ServiceCpu,
    ServiceMemory,
    Target5xx,
}

/// Alarm on one of the environment's metrics
#[derive(Debug, Clone)]
pub struct AlarmSpec {
    pub id: &'static str,
    pub name_suffix: &'static str,
    pub description: &'static str,
    pub metric: WatchedMetric,
    pub threshold: u32,
}

/// Infrastructure every stage of the calculator merger shares.
///
/// `provision` declares the network, cluster, task definition and load
/// balancer. The stage then declares its listeners and calls
/// `attach_service` to put the Fargate service behind them.
#[derive(Debug, Clone)]
pub struct ServiceEnvironment {
    pub stage: String,
    pub vpc: Vpc,
    pub cluster: Cluster,
    pub task_definition: TaskDefinition,
    pub load_balancer: LoadBalancer,
    pub service_security_group: SecurityGroup,
}

impl ServiceEnvironment {
    pub fn provision(stack: &mut Stack, profile: &EnvironmentProfile) -> Result<Self, SynthError> {
        validate_stage(&profile.stage)?;
        let stage = profile.stage.as_str();

        let vpc = add_vpc(
            stack,
            "CalculatorMergerVPC",
            &VpcProps {
                vpc_name: format!("calculator-merger-{}-vpc", stage),
                cidr: DEFAULT_VPC_CIDR.to_string(),
                max_azs: profile.max_azs,
                nat_gateways: profile.nat_gateways,
            },
        )?;

        let cluster = add_cluster(
            stack,
            "CalculatorMergerCluster",
            &ClusterProps {
                cluster_name: format!("aws-calculator-merger-{}-cluster", stage),
                container_insights: true,
            },
        )?;

        let execution_role = add_role(
            stack,
            "TaskExecutionRole",
            &RoleProps {
                assumed_by: ECS_TASKS_PRINCIPAL.to_string(),
                managed_policies: vec![ECS_TASK_EXECUTION_POLICY.to_string()],
            },
        )?;
        let task_role = add_role(
            stack,
            "TaskRole",
            &RoleProps {
                assumed_by: ECS_TASKS_PRINCIPAL.to_string(),
                managed_policies: Vec::new(),
            },
        )?;

        let log_group = add_log_group(
            stack,
            "CalculatorMergerLogs",
            &LogGroupProps {
                log_group_name: format!("/ecs/aws-calculator-merger-{}", stage),
                retention: profile.log_retention,
                removal_policy: profile.log_removal_policy,
            },
        )?;

        let mut environment = BTreeMap::new();
        environment.insert("FLASK_ENV".to_string(), profile.flask_env.clone());
        environment.insert("STAGE".to_string(), stage.to_string());

        let repository = RepositoryRef::from_name(REPOSITORY_NAME);
        let task_definition = add_fargate_task_definition(
            stack,
            "CalculatorMergerTask",
            &TaskDefinitionProps {
                family: format!("aws-calculator-merger-{}", stage),
                cpu: profile.cpu,
                memory_mib: profile.memory_mib,
                execution_role,
                task_role,
                containers: vec![ContainerDefinition {
                    name: CONTAINER_NAME.to_string(),
                    image: repository.image(IMAGE_TAG),
                    essential: true,
                    container_port: CONTAINER_PORT,
                    log_group,
                    stream_prefix: STREAM_PREFIX.to_string(),
                    environment,
                    health_check: profile.container_health_check.clone(),
                }],
            },
        )?;
        debug!(
            stack = %stack.name(),
            repository = %repository.name(),
            family = %task_definition.family,
            "Task definition pulls from shared repository"
        );

        let lb_security_group = add_security_group(
            stack,
            "LBSecurityGroup",
            &SecurityGroupProps {
                group_name: format!("calculator-merger-{}-lb-sg", stage),
                vpc: vpc.id.clone(),
                allow_all_outbound: true,
            },
        )?;
        for (port, description) in &profile.public_ports {
            add_ingress_rule(
                stack,
                &lb_security_group,
                &IngressRule::tcp_from_anywhere(*port, description),
            )?;
        }

        let service_security_group = add_security_group(
            stack,
            "ServiceSecurityGroup",
            &SecurityGroupProps {
                group_name: format!("calculator-merger-{}-service-sg", stage),
                vpc: vpc.id.clone(),
                allow_all_outbound: true,
            },
        )?;
        add_ingress_rule(
            stack,
            &service_security_group,
            &IngressRule {
                peer: Peer::SecurityGroup(lb_security_group.id.clone()),
                port: CONTAINER_PORT,
                description: "Allow traffic from ALB".to_string(),
            },
        )?;

        let load_balancer = add_load_balancer(
            stack,
            "CalculatorMergerLB",
            &vpc,
            &LoadBalancerProps {
                load_balancer_name: format!("calculator-merger-{}-lb", stage),
                internet_facing: true,
                security_groups: vec![lb_security_group.group_id()],
                idle_timeout_secs: profile.lb_idle_timeout_secs,
            },
        )?;

        Ok(Self {
            stage: stage.to_string(),
            vpc,
            cluster,
            task_definition,
            load_balancer,
            service_security_group,
        })
    }

    /// Target group the service registers into; listeners forward to it
    pub fn add_target_group(
        &self,
        stack: &mut Stack,
        health_check: HealthCheck,
        deregistration_delay_secs: Option<u32>,
    ) -> Result<TargetGroup, SynthError> {
        add_target_group(
            stack,
            "CalculatorMergerTarget",
            &self.vpc,
            &TargetGroupProps {
                port: TARGET_PORT,
                health_check,
                deregistration_delay_secs,
            },
        )
    }

    /// Run the service behind `target_group` and wire up its autoscaling
    pub fn attach_service(
        &self,
        stack: &mut Stack,
        target_group: &TargetGroup,
        listeners: &[LogicalId],
        profile: &ServiceProfile,
    ) -> Result<FargateService, SynthError> {
        profile.capacity.validate()?;
        if profile.desired_count < profile.capacity.min || profile.desired_count > profile.capacity.max
        {
            return Err(SynthError::InvalidCapacity(format!(
                "desired count {} is outside {}..={}",
                profile.desired_count, profile.capacity.min, profile.capacity.max
            )));
        }

        let service = add_fargate_service(
            stack,
            "CalculatorMergerService",
            &self.cluster,
            &self.task_definition,
            &FargateServiceProps {
                service_name: format!("aws-calculator-merger-{}-service", self.stage),
                desired_count: profile.desired_count,
                assign_public_ip: false,
                subnets: self.vpc.private_subnet_refs(),
                security_groups: vec![self.service_security_group.group_id()],
                health_check_grace_secs: profile.health_check_grace_secs,
                deployment_controller: profile.deployment_controller,
                circuit_breaker: profile.circuit_breaker_rollback,
                target_group: Some(target_group.clone()),
                listeners: listeners.to_vec(),
            },
        )?;

        let scalable_target = add_scalable_target(
            stack,
            "CalculatorMergerService",
            &self.cluster,
            &service,
            &profile.capacity,
        )?;
        add_target_tracking_policy(
            stack,
            &scalable_target,
            "CpuScaling",
            &TargetTrackingProps {
                metric: TrackedMetric::CpuUtilization,
                target_value: profile.cpu_scaling.target_percent,
                scale_in_cooldown_secs: Some(profile.cpu_scaling.scale_in_cooldown_secs),
                scale_out_cooldown_secs: Some(profile.cpu_scaling.scale_out_cooldown_secs),
            },
        )?;
        add_target_tracking_policy(
            stack,
            &scalable_target,
            "RequestScaling",
            &TargetTrackingProps {
                metric: TrackedMetric::RequestCountPerTarget {
                    load_balancer: self.load_balancer.clone(),
                    target_group: target_group.clone(),
                },
                target_value: profile.requests_per_target,
                scale_in_cooldown_secs: None,
                scale_out_cooldown_secs: None,
            },
        )?;

        Ok(service)
    }

    pub fn add_alarms(
        &self,
        stack: &mut Stack,
        service: &FargateService,
        alarms: &[AlarmSpec],
    ) -> Result<(), SynthError> {
        for alarm in alarms {
            let metric = match alarm.metric {
                WatchedMetric::ServiceCpu => Metric::service_cpu_utilization(&self.cluster, service),
                WatchedMetric::ServiceMemory => {
                    Metric::service_memory_utilization(&self.cluster, service)
                }
                WatchedMetric::Target5xx => Metric::target_5xx_count(&self.load_balancer),
            };
            add_alarm(
                stack,
                alarm.id,
                &AlarmProps {
                    alarm_name: format!("calculator-merger-{}-{}", self.stage, alarm.name_suffix),
                    description: alarm.description.to_string(),
                    metric,
                    threshold: alarm.threshold,
                    evaluation_periods: ALARM_EVALUATION_PERIODS,
                    datapoints_to_alarm: ALARM_DATAPOINTS,
                },
            )?;
        }
        Ok(())
    }

    /// `LoadBalancerDNS` and `ServiceName` outputs, exported per stage
    pub fn add_outputs(&self, stack: &mut Stack, service: &FargateService, lb_dns_description: &str) {
        stack.add_output(
            "LoadBalancerDNS",
            Output::new(self.load_balancer.dns_name(), lb_dns_description)
                .exported_as(export_name(&self.stage, "LbDns")),
        );
        stack.add_output(
            "ServiceName",
            Output::new(service.service_name(), "ECS service name")
                .exported_as(export_name(&self.stage, "ServiceName")),
        );
    }
}

/// Target group health check shared by both environments
pub fn root_health_check(healthy: Option<u32>, unhealthy: Option<u32>) -> HealthCheck {
    HealthCheck {
        path: "/".to_string(),
        interval_secs: 30,
        timeout_secs: 5,
        healthy_threshold: healthy,
        unhealthy_threshold: unhealthy,
        healthy_http_codes: "200".to_string(),
    }
}

/// Values an application URL output points at
pub fn https_url(domain: &str) -> Value {
    Value::String(format!("https://{}", domain))
}
