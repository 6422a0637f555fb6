use tracing::{debug, info};

use crate::constructs::autoscaling::{CapacityPlan, ScheduledFloor};
use crate::constructs::cdn::{add_distribution, add_log_bucket, DistributionProps};
use crate::constructs::dns::{add_dns_validated_certificate, add_load_balancer_alias, HostedZone};
use crate::constructs::ecs::{ContainerHealthCheck, DeploymentControllerType};
use crate::constructs::elb::{
    add_listener, ListenerAction, ListenerProps, Protocol, TargetGroup, RECOMMENDED_SSL_POLICY,
};
use crate::constructs::logs::RetentionDays;
use crate::constructs::waf::{
    add_web_acl, add_web_acl_association, RuleAction, Scope, WebAclProps, WebAclRule,
};
use crate::error::SynthError;
use crate::stack::{Stack, StackEnv};
use crate::template::{DeletionPolicy, LogicalId, Output, Parameter};

use super::export_name;
use super::service_environment::{
    https_url, root_health_check, AlarmSpec, CpuScaling, EnvironmentProfile, ServiceEnvironment,
    ServiceProfile, WatchedMetric, CONTAINER_PORT,
};

/// Parameter receiving the edge stack's certificate ARN
pub const CERTIFICATE_PARAMETER: &str = "CloudFrontCertificateArn";

pub const CLOUDFRONT_LOG_PREFIX: &str = "cloudfront-logs/";

/// Custom domain served over HTTPS, with its hosted zone already resolved
#[derive(Debug, Clone)]
pub struct ProdDomain {
    pub domain_name: String,
    pub zone: HostedZone,
    pub edge_stack_name: String,
}

#[derive(Debug, Clone)]
pub struct ProdStackProps {
    pub stack_name: String,
    pub stage: String,
    pub domain: Option<ProdDomain>,
}

fn environment_profile(stage: &str) -> EnvironmentProfile {
    let mut health_check =
        ContainerHealthCheck::shell(&format!("curl -f http://localhost:{}/ || exit 1", CONTAINER_PORT));
    health_check.start_period_secs = 60;

    EnvironmentProfile {
        stage: stage.to_string(),
        max_azs: 3,
        nat_gateways: 3,
        cpu: 512,
        memory_mib: 1024,
        flask_env: "production".to_string(),
        log_retention: RetentionDays::ThreeMonths,
        log_removal_policy: DeletionPolicy::Retain,
        container_health_check: Some(health_check),
        lb_idle_timeout_secs: Some(60),
        public_ports: vec![
            (80, "Allow HTTP traffic from anywhere"),
            (443, "Allow HTTPS traffic from anywhere"),
        ],
    }
}

fn service_profile() -> ServiceProfile {
    ServiceProfile {
        desired_count: 2,
        health_check_grace_secs: 120,
        deployment_controller: Some(DeploymentControllerType::Ecs),
        circuit_breaker_rollback: Some(true),
        capacity: CapacityPlan::new(2, 10)
            .with_schedule(ScheduledFloor::daily("BusinessHoursScaling", 8, 0, 4))
            .with_schedule(ScheduledFloor::daily("AfterHoursScaling", 18, 0, 2)),
        cpu_scaling: CpuScaling {
            target_percent: 60,
            scale_in_cooldown_secs: 300,
            scale_out_cooldown_secs: 60,
        },
        requests_per_target: 800,
    }
}

const ALARMS: [AlarmSpec; 3] = [
    AlarmSpec {
        id: "CpuUtilizationAlarm",
        name_suffix: "cpu-alarm",
        description: "CPU utilization is too high",
        metric: WatchedMetric::ServiceCpu,
        threshold: 80,
    },
    AlarmSpec {
        id: "MemoryUtilizationAlarm",
        name_suffix: "memory-alarm",
        description: "Memory utilization is too high",
        metric: WatchedMetric::ServiceMemory,
        threshold: 80,
    },
    AlarmSpec {
        id: "Http5xxAlarm",
        name_suffix: "5xx-alarm",
        description: "Too many 5XX errors",
        metric: WatchedMetric::Target5xx,
        threshold: 10,
    },
];

/// HTTPS on 443 plus a permanent redirect from 80; returns the forwarding listener
fn add_https_listeners(
    stack: &mut Stack,
    environment: &ServiceEnvironment,
    target_group: &TargetGroup,
    domain: &ProdDomain,
) -> Result<LogicalId, SynthError> {
    let certificate =
        add_dns_validated_certificate(stack, "Certificate", &domain.domain_name, &domain.zone)?;

    let https = add_listener(
        stack,
        &environment.load_balancer,
        "HttpsListener",
        &ListenerProps {
            port: 443,
            protocol: Protocol::Https,
            certificates: vec![certificate.arn()],
            ssl_policy: Some(RECOMMENDED_SSL_POLICY.to_string()),
            default_action: ListenerAction::Forward(target_group.clone()),
        },
    )?;
    add_listener(
        stack,
        &environment.load_balancer,
        "HttpListener",
        &ListenerProps {
            port: 80,
            protocol: Protocol::Http,
            certificates: Vec::new(),
            ssl_policy: None,
            default_action: ListenerAction::Redirect {
                protocol: Protocol::Https,
                port: 443,
                permanent: true,
            },
        },
    )?;

    add_load_balancer_alias(
        stack,
        "AliasRecord",
        &domain.zone,
        &domain.domain_name,
        &environment.load_balancer,
    )?;

    Ok(https)
}

fn add_firewall(
    stack: &mut Stack,
    environment: &ServiceEnvironment,
) -> Result<(), SynthError> {
    let web_acl = add_web_acl(
        stack,
        "WebACL",
        &WebAclProps {
            name: format!("calculator-merger-{}-waf", environment.stage),
            scope: Scope::Regional,
            default_action: RuleAction::Allow,
            rules: vec![
                WebAclRule::rate_limit("RateLimitRule", 1, 1000),
                WebAclRule::aws_managed("AWSManagedRulesSQLiRuleSet", 10),
            ],
        },
    )?;
    add_web_acl_association(
        stack,
        "WebACLAssociation",
        &web_acl,
        environment.load_balancer.arn(),
    )?;
    Ok(())
}

fn add_cdn(
    stack: &mut Stack,
    environment: &ServiceEnvironment,
    domain: &ProdDomain,
) -> Result<(), SynthError> {
    let certificate_arn = stack.add_parameter(
        CERTIFICATE_PARAMETER,
        Parameter {
            type_name: "String".to_string(),
            description: Some(format!(
                "ARN of the us-east-1 certificate for {} (output of {})",
                domain.domain_name, domain.edge_stack_name
            )),
        },
    );
    stack.add_dependency(&domain.edge_stack_name);

    let log_bucket = add_log_bucket(stack, "CloudFrontLogsBucket", DeletionPolicy::Retain)?;
    add_distribution(
        stack,
        "Distribution",
        &DistributionProps {
            origin_domain: environment.load_balancer.dns_name(),
            aliases: vec![domain.domain_name.clone()],
            certificate_arn,
            log_bucket,
            log_prefix: CLOUDFRONT_LOG_PREFIX.to_string(),
        },
    )?;
    Ok(())
}

/// Production environment; HTTPS, DNS and CDN only when a domain is given
pub fn prod_stack(env: &StackEnv, props: &ProdStackProps) -> Result<Stack, SynthError> {
    let mut stack = Stack::new(
        &props.stack_name,
        env.clone(),
        &format!("AWS pricing calculator merger ({} environment)", props.stage),
    );

    let environment = ServiceEnvironment::provision(&mut stack, &environment_profile(&props.stage))?;
    let target_group =
        environment.add_target_group(&mut stack, root_health_check(Some(2), Some(3)), Some(30))?;

    let listener = match &props.domain {
        Some(domain) => {
            debug!(
                domain = %domain.domain_name,
                zone = %domain.zone.zone_name,
                zone_id = %domain.zone.zone_id,
                "Using hosted zone for custom domain"
            );
            add_https_listeners(&mut stack, &environment, &target_group, domain)?
        }
        None => add_listener(
            &mut stack,
            &environment.load_balancer,
            "HttpListener",
            &ListenerProps::http_forward(80, &target_group),
        )?,
    };

    let service =
        environment.attach_service(&mut stack, &target_group, &[listener], &service_profile())?;
    environment.add_alarms(&mut stack, &service, &ALARMS)?;
    add_firewall(&mut stack, &environment)?;

    if let Some(domain) = &props.domain {
        add_cdn(&mut stack, &environment, domain)?;
        stack.add_output(
            "ApplicationURL",
            Output::new(https_url(&domain.domain_name), "Application URL")
                .exported_as(export_name(&props.stage, "URL")),
        );
    }
    environment.add_outputs(&mut stack, &service, "Load balancer DNS name of the application");

    info!(
        stack = %stack.name(),
        stage = %props.stage,
        domain = props.domain.as_ref().map(|d| d.domain_name.as_str()).unwrap_or("-"),
        resources = stack.template().resources.len(),
        "Synthesized production stack"
    );
    Ok(stack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn domain() -> ProdDomain {
        ProdDomain {
            domain_name: "calculator-merger.example.com".to_string(),
            zone: HostedZone {
                zone_id: "Z0EXAMPLE".to_string(),
                zone_name: "example.com".to_string(),
            },
            edge_stack_name: "CalculatorMergerProdEdgeCertificateStack".to_string(),
        }
    }

    fn synth(domain: Option<ProdDomain>) -> Stack {
        prod_stack(
            &StackEnv::new(None, "ap-northeast-1"),
            &ProdStackProps {
                stack_name: "CalculatorMergerProdStack".to_string(),
                stage: "prod".to_string(),
                domain,
            },
        )
        .unwrap()
    }

    fn listeners(stack: &Stack) -> Vec<&Value> {
        stack
            .template()
            .resources_of_type("AWS::ElasticLoadBalancingV2::Listener")
            .map(|(_, r)| &r.properties)
            .collect()
    }

    /// Target tracking configuration of the policy on `metric_type`
    fn tracking_config<'a>(stack: &'a Stack, metric_type: &str) -> &'a Value {
        stack
            .template()
            .resources_of_type("AWS::ApplicationAutoScaling::ScalingPolicy")
            .map(|(_, r)| &r.properties["TargetTrackingScalingPolicyConfiguration"])
            .find(|c| c["PredefinedMetricSpecification"]["PredefinedMetricType"] == metric_type)
            .unwrap()
    }

    #[test]
    fn test_without_domain_serves_plain_http() {
        let stack = synth(None);
        let template = stack.template();
        assert_eq!(template.count_of_type("AWS::CertificateManager::Certificate"), 0);
        assert_eq!(template.count_of_type("AWS::Route53::RecordSet"), 0);
        assert_eq!(template.count_of_type("AWS::CloudFront::Distribution"), 0);
        assert_eq!(template.count_of_type("AWS::S3::Bucket"), 0);
        assert!(template.parameters.is_empty());
        assert!(stack.dependencies().is_empty());

        let listeners = listeners(&stack);
        assert_eq!(listeners.len(), 1);
        assert_eq!(listeners[0]["Port"], 80);
        assert_eq!(listeners[0]["Protocol"], "HTTP");
        assert_eq!(listeners[0]["DefaultActions"][0]["Type"], "forward");
        assert!(!template.outputs.contains_key("ApplicationURL"));

        // WAF does not depend on the domain
        assert_eq!(template.count_of_type("AWS::WAFv2::WebACL"), 1);
        assert_eq!(template.count_of_type("AWS::WAFv2::WebACLAssociation"), 1);
    }

    #[test]
    fn test_with_domain_redirects_to_https() {
        let stack = synth(Some(domain()));
        let listeners = listeners(&stack);
        assert_eq!(listeners.len(), 2);

        let https = listeners.iter().find(|l| l["Port"] == 443).unwrap();
        assert_eq!(https["Protocol"], "HTTPS");
        assert_eq!(https["SslPolicy"], "ELBSecurityPolicy-2016-08");
        assert_eq!(https["DefaultActions"][0]["Type"], "forward");

        let http = listeners.iter().find(|l| l["Port"] == 80).unwrap();
        assert_eq!(
            http["DefaultActions"][0]["RedirectConfig"],
            json!({"Protocol": "HTTPS", "Port": "443", "StatusCode": "HTTP_301"})
        );
    }

    #[test]
    fn test_with_domain_declares_dns_and_cdn() {
        let stack = synth(Some(domain()));
        let template = stack.template();

        let (_, record) = template.resources_of_type("AWS::Route53::RecordSet").next().unwrap();
        assert_eq!(record.properties["Name"], "calculator-merger.example.com.");
        assert_eq!(record.properties["HostedZoneId"], "Z0EXAMPLE");
        let (lb_id, _) = template
            .resources_of_type("AWS::ElasticLoadBalancingV2::LoadBalancer")
            .next()
            .unwrap();
        assert_eq!(
            record.properties["AliasTarget"]["HostedZoneId"],
            json!({"Fn::GetAtt": [lb_id, "CanonicalHostedZoneID"]})
        );

        let (_, distribution) = template
            .resources_of_type("AWS::CloudFront::Distribution")
            .next()
            .unwrap();
        let config = &distribution.properties["DistributionConfig"];
        assert_eq!(
            config["DefaultCacheBehavior"]["ViewerProtocolPolicy"],
            "redirect-to-https"
        );
        assert_eq!(
            config["ViewerCertificate"]["AcmCertificateArn"],
            json!({"Ref": CERTIFICATE_PARAMETER})
        );
        assert!(template.parameters.contains_key(CERTIFICATE_PARAMETER));
        assert_eq!(
            stack.dependencies(),
            ["CalculatorMergerProdEdgeCertificateStack".to_string()]
        );
        assert_eq!(
            template.outputs["ApplicationURL"].value,
            json!("https://calculator-merger.example.com")
        );
        assert_eq!(
            template.outputs["ApplicationURL"].export.as_ref().unwrap().name,
            "CalculatorMergerProdURL"
        );
    }

    #[test]
    fn test_capacity_and_schedules() {
        let stack = synth(None);
        let (_, target) = stack
            .template()
            .resources_of_type("AWS::ApplicationAutoScaling::ScalableTarget")
            .next()
            .unwrap();
        assert_eq!(target.properties["MinCapacity"], 2);
        assert_eq!(target.properties["MaxCapacity"], 10);
        let actions = target.properties["ScheduledActions"].as_array().unwrap();
        assert_eq!(actions[0]["ScheduledActionName"], "BusinessHoursScaling");
        assert_eq!(actions[0]["Schedule"], "cron(0 8 * * ? *)");
        assert_eq!(actions[1]["ScalableTargetAction"]["MinCapacity"], 2);

        let cpu = tracking_config(&stack, "ECSServiceAverageCPUUtilization");
        assert_eq!(cpu["TargetValue"], 60);
        assert_eq!(cpu["ScaleInCooldown"], 300);
        assert_eq!(cpu["ScaleOutCooldown"], 60);
        let requests = tracking_config(&stack, "ALBRequestCountPerTarget");
        assert_eq!(requests["TargetValue"], 800);
        assert!(requests.get("ScaleInCooldown").is_none());

        let plan = service_profile().capacity;
        assert!(plan.schedules.iter().all(|s| s.min_capacity <= plan.max));
        assert_eq!(plan.floor_at(9, 0), 4);
        assert_eq!(plan.floor_at(19, 0), 2);
    }

    #[test]
    fn test_alarms_and_service_settings() {
        let stack = synth(None);
        let template = stack.template();
        let names: Vec<&Value> = template
            .resources_of_type("AWS::CloudWatch::Alarm")
            .map(|(_, r)| &r.properties["AlarmName"])
            .collect();
        assert_eq!(names.len(), 3);
        for suffix in ["cpu", "memory", "5xx"] {
            let expected = json!(format!("calculator-merger-prod-{}-alarm", suffix));
            assert!(names.contains(&&expected), "missing {}", expected);
        }

        let (_, service) = template.resources_of_type("AWS::ECS::Service").next().unwrap();
        assert_eq!(service.properties["DesiredCount"], 2);
        assert_eq!(service.properties["HealthCheckGracePeriodSeconds"], 120);
        assert_eq!(
            service.properties["DeploymentConfiguration"]["DeploymentCircuitBreaker"]["Rollback"],
            true
        );

        let (_, task) = template.resources_of_type("AWS::ECS::TaskDefinition").next().unwrap();
        let container = &task.properties["ContainerDefinitions"][0];
        assert_eq!(container["HealthCheck"]["Retries"], 3);
        assert!(container["Environment"]
            .as_array()
            .unwrap()
            .contains(&json!({"Name": "FLASK_ENV", "Value": "production"})));

        let (_, target_group) = template
            .resources_of_type("AWS::ElasticLoadBalancingV2::TargetGroup")
            .next()
            .unwrap();
        assert_eq!(target_group.properties["HealthyThresholdCount"], 2);
        assert_eq!(target_group.properties["UnhealthyThresholdCount"], 3);
        assert!(target_group.properties["TargetGroupAttributes"]
            .as_array()
            .unwrap()
            .contains(&json!({"Key": "deregistration_delay.timeout_seconds", "Value": "30"})));

        let (_, lb) = template
            .resources_of_type("AWS::ElasticLoadBalancingV2::LoadBalancer")
            .next()
            .unwrap();
        assert!(lb.properties["LoadBalancerAttributes"]
            .as_array()
            .unwrap()
            .contains(&json!({"Key": "idle_timeout.timeout_seconds", "Value": "60"})));

        assert_eq!(template.count_of_type("AWS::EC2::NatGateway"), 3);
        let (_, log_group) = template.resources_of_type("AWS::Logs::LogGroup").next().unwrap();
        assert_eq!(log_group.properties["RetentionInDays"], 90);
        assert_eq!(log_group.deletion_policy, Some(DeletionPolicy::Retain));
    }
}
