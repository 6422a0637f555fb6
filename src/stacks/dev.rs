use tracing::info;

use crate::constructs::autoscaling::CapacityPlan;
use crate::constructs::elb::{add_listener, ListenerProps};
use crate::constructs::logs::RetentionDays;
use crate::error::SynthError;
use crate::stack::{Stack, StackEnv};
use crate::template::DeletionPolicy;

use super::service_environment::{
    flask_env, root_health_check, AlarmSpec, CpuScaling, EnvironmentProfile, ServiceEnvironment,
    ServiceProfile, WatchedMetric,
};

#[derive(Debug, Clone)]
pub struct DevStackProps {
    pub stack_name: String,
    pub stage: String,
}

fn environment_profile(stage: &str) -> EnvironmentProfile {
    EnvironmentProfile {
        stage: stage.to_string(),
        max_azs: 2,
        nat_gateways: 1,
        cpu: 256,
        memory_mib: 512,
        flask_env: flask_env(stage).to_string(),
        log_retention: RetentionDays::OneMonth,
        log_removal_policy: DeletionPolicy::Delete,
        container_health_check: None,
        lb_idle_timeout_secs: None,
        public_ports: vec![(80, "Allow HTTP traffic from anywhere")],
    }
}

fn service_profile() -> ServiceProfile {
    ServiceProfile {
        desired_count: 1,
        health_check_grace_secs: 60,
        deployment_controller: None,
        circuit_breaker_rollback: None,
        capacity: CapacityPlan::new(1, 4),
        cpu_scaling: CpuScaling {
            target_percent: 70,
            scale_in_cooldown_secs: 60,
            scale_out_cooldown_secs: 60,
        },
        requests_per_target: 1000,
    }
}

const ALARMS: [AlarmSpec; 1] = [AlarmSpec {
    id: "CpuUtilizationAlarm",
    name_suffix: "cpu-alarm",
    description: "CPU utilization is too high",
    metric: WatchedMetric::ServiceCpu,
    threshold: 85,
}];

/// Single-listener development environment
pub fn dev_stack(env: &StackEnv, props: &DevStackProps) -> Result<Stack, SynthError> {
    let mut stack = Stack::new(
        &props.stack_name,
        env.clone(),
        &format!("AWS pricing calculator merger ({} environment)", props.stage),
    );

    let environment = ServiceEnvironment::provision(&mut stack, &environment_profile(&props.stage))?;

    let target_group = environment.add_target_group(&mut stack, root_health_check(None, None), None)?;
    let listener = add_listener(
        &mut stack,
        &environment.load_balancer,
        "Listener",
        &ListenerProps::http_forward(80, &target_group),
    )?;

    let service =
        environment.attach_service(&mut stack, &target_group, &[listener], &service_profile())?;
    environment.add_alarms(&mut stack, &service, &ALARMS)?;
    environment.add_outputs(&mut stack, &service, "Load balancer DNS name of the application");

    info!(
        stack = %stack.name(),
        stage = %props.stage,
        resources = stack.template().resources.len(),
        "Synthesized development stack"
    );
    Ok(stack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn synth(stage: &str) -> Stack {
        dev_stack(
            &StackEnv::new(None, "ap-northeast-1"),
            &DevStackProps {
                stack_name: "CalculatorMergerDevStack".to_string(),
                stage: stage.to_string(),
            },
        )
        .unwrap()
    }

    fn only<'a>(stack: &'a Stack, type_name: &'a str) -> &'a Value {
        let mut resources = stack.template().resources_of_type(type_name);
        let (_, resource) = resources.next().unwrap();
        assert!(resources.next().is_none(), "more than one {}", type_name);
        &resource.properties
    }

    #[test]
    fn test_names_follow_stage() {
        for stage in ["dev", "qa", "feature-1"] {
            let stack = synth(stage);
            assert_eq!(
                only(&stack, "AWS::ECS::Service")["ServiceName"],
                format!("aws-calculator-merger-{}-service", stage)
            );
            assert_eq!(
                only(&stack, "AWS::Logs::LogGroup")["LogGroupName"],
                format!("/ecs/aws-calculator-merger-{}", stage)
            );
        }
    }

    #[test]
    fn test_dev_sizing() {
        let stack = synth("dev");
        let template = stack.template();
        assert_eq!(template.count_of_type("AWS::EC2::NatGateway"), 1);
        assert_eq!(template.count_of_type("AWS::EC2::Subnet"), 4);
        assert_eq!(template.count_of_type("AWS::ElasticLoadBalancingV2::Listener"), 1);
        assert_eq!(template.count_of_type("AWS::CloudWatch::Alarm"), 1);

        let task = only(&stack, "AWS::ECS::TaskDefinition");
        assert_eq!(task["Cpu"], "256");
        assert_eq!(task["Memory"], "512");
        let env = &task["ContainerDefinitions"][0]["Environment"];
        assert!(env.as_array().unwrap().contains(&serde_json::json!({
            "Name": "FLASK_ENV", "Value": "development"
        })));

        let target = only(&stack, "AWS::ApplicationAutoScaling::ScalableTarget");
        assert_eq!(target["MinCapacity"], 1);
        assert_eq!(target["MaxCapacity"], 4);
        assert!(target.get("ScheduledActions").is_none());

        let policies: Vec<&Value> = template
            .resources_of_type("AWS::ApplicationAutoScaling::ScalingPolicy")
            .map(|(_, r)| &r.properties["TargetTrackingScalingPolicyConfiguration"])
            .collect();
        assert_eq!(policies.len(), 2);
        let cpu = policies
            .iter()
            .find(|c| {
                c["PredefinedMetricSpecification"]["PredefinedMetricType"]
                    == "ECSServiceAverageCPUUtilization"
            })
            .unwrap();
        assert_eq!(cpu["TargetValue"], 70);
        assert_eq!(cpu["ScaleInCooldown"], 60);
        assert_eq!(cpu["ScaleOutCooldown"], 60);
        let requests = policies
            .iter()
            .find(|c| {
                c["PredefinedMetricSpecification"]["PredefinedMetricType"]
                    == "ALBRequestCountPerTarget"
            })
            .unwrap();
        assert_eq!(requests["TargetValue"], 1000);

        let target_group = only(&stack, "AWS::ElasticLoadBalancingV2::TargetGroup");
        assert!(target_group.get("HealthyThresholdCount").is_none());
        assert_eq!(
            target_group["TargetGroupAttributes"],
            serde_json::json!([{"Key": "stickiness.enabled", "Value": "false"}])
        );

        let alarm = only(&stack, "AWS::CloudWatch::Alarm");
        assert_eq!(alarm["AlarmName"], "calculator-merger-dev-cpu-alarm");
        assert_eq!(alarm["Threshold"], 85);
    }

    #[test]
    fn test_listener_forwards_and_service_waits_for_it() {
        let stack = synth("dev");
        let template = stack.template();
        let (listener_id, listener) = template
            .resources_of_type("AWS::ElasticLoadBalancingV2::Listener")
            .next()
            .unwrap();
        assert_eq!(listener.properties["Port"], 80);
        assert_eq!(listener.properties["DefaultActions"][0]["Type"], "forward");

        let (_, service) = template.resources_of_type("AWS::ECS::Service").next().unwrap();
        assert_eq!(service.depends_on, vec![listener_id.clone()]);
        assert_eq!(service.properties["DesiredCount"], 1);
    }

    #[test]
    fn test_outputs_are_exported_per_stage() {
        let stack = synth("dev");
        let outputs = &stack.template().outputs;
        assert_eq!(
            outputs["LoadBalancerDNS"].export.as_ref().unwrap().name,
            "CalculatorMergerDevLbDns"
        );
        assert_eq!(
            outputs["ServiceName"].export.as_ref().unwrap().name,
            "CalculatorMergerDevServiceName"
        );
        assert!(!outputs.contains_key("ApplicationURL"));
    }
}
