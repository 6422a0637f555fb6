use serde_json::{json, Value};

use crate::error::SynthError;
use crate::stack::Stack;
use crate::template::{LogicalId, Resource};

use super::network::Vpc;

/// `SslPolicy.RECOMMENDED` of the load balancing service
pub const RECOMMENDED_SSL_POLICY: &str = "ELBSecurityPolicy-2016-08";

#[derive(Debug, Clone)]
pub struct LoadBalancerProps {
    pub load_balancer_name: String,
    pub internet_facing: bool,
    pub security_groups: Vec<Value>,
    pub idle_timeout_secs: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct LoadBalancer {
    pub id: LogicalId,
}

impl LoadBalancer {
    pub fn arn(&self) -> Value {
        self.id.reference()
    }

    pub fn dns_name(&self) -> Value {
        self.id.attr("DNSName")
    }

    /// `app/<name>/<id>`, the value CloudWatch uses as the LoadBalancer dimension
    pub fn full_name(&self) -> Value {
        self.id.attr("LoadBalancerFullName")
    }

    pub fn canonical_hosted_zone_id(&self) -> Value {
        self.id.attr("CanonicalHostedZoneID")
    }
}

/// Application load balancer placed in the public subnets of `vpc`
pub fn add_load_balancer(
    stack: &mut Stack,
    id: &str,
    vpc: &Vpc,
    props: &LoadBalancerProps,
) -> Result<LoadBalancer, SynthError> {
    let mut attributes = vec![json!({ "Key": "deletion_protection.enabled", "Value": "false" })];
    if let Some(idle_timeout) = props.idle_timeout_secs {
        attributes.push(json!({
            "Key": "idle_timeout.timeout_seconds",
            "Value": idle_timeout.to_string(),
        }));
    }

    let mut resource = Resource::new(
        "AWS::ElasticLoadBalancingV2::LoadBalancer",
        json!({
            "Name": props.load_balancer_name,
            "Type": "application",
            "Scheme": if props.internet_facing { "internet-facing" } else { "internal" },
            "Subnets": if props.internet_facing {
                vpc.public_subnet_refs()
            } else {
                vpc.private_subnet_refs()
            },
            "SecurityGroups": props.security_groups,
            "LoadBalancerAttributes": attributes,
        }),
    );
    // An internet-facing balancer is unreachable until the public routes exist
    if props.internet_facing {
        for route in &vpc.internet_routes {
            resource = resource.depends_on(route);
        }
    }

    let id = stack.add_resource(&format!("{}/Resource", id), resource)?;
    Ok(LoadBalancer { id })
}

#[derive(Debug, Clone)]
pub struct HealthCheck {
    pub path: String,
    pub interval_secs: u32,
    pub timeout_secs: u32,
    pub healthy_threshold: Option<u32>,
    pub unhealthy_threshold: Option<u32>,
    pub healthy_http_codes: String,
}

#[derive(Debug, Clone)]
pub struct TargetGroupProps {
    pub port: u16,
    pub health_check: HealthCheck,
    pub deregistration_delay_secs: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct TargetGroup {
    pub id: LogicalId,
}

impl TargetGroup {
    pub fn arn(&self) -> Value {
        self.id.reference()
    }

    pub fn full_name(&self) -> Value {
        self.id.attr("TargetGroupFullName")
    }
}

/// HTTP target group of `ip` targets, the kind Fargate tasks register into
pub fn add_target_group(
    stack: &mut Stack,
    id: &str,
    vpc: &Vpc,
    props: &TargetGroupProps,
) -> Result<TargetGroup, SynthError> {
    let check = &props.health_check;
    let mut properties = json!({
        "Port": props.port,
        "Protocol": "HTTP",
        "TargetType": "ip",
        "VpcId": vpc.id.reference(),
        "HealthCheckPath": check.path,
        "HealthCheckIntervalSeconds": check.interval_secs,
        "HealthCheckTimeoutSeconds": check.timeout_secs,
        "Matcher": { "HttpCode": check.healthy_http_codes },
    });
    if let Some(healthy) = check.healthy_threshold {
        properties["HealthyThresholdCount"] = json!(healthy);
    }
    if let Some(unhealthy) = check.unhealthy_threshold {
        properties["UnhealthyThresholdCount"] = json!(unhealthy);
    }

    let mut attributes = vec![json!({ "Key": "stickiness.enabled", "Value": "false" })];
    if let Some(delay) = props.deregistration_delay_secs {
        attributes.insert(
            0,
            json!({ "Key": "deregistration_delay.timeout_seconds", "Value": delay.to_string() }),
        );
    }
    properties["TargetGroupAttributes"] = Value::Array(attributes);

    let id = stack.add_resource(
        &format!("{}/Resource", id),
        Resource::new("AWS::ElasticLoadBalancingV2::TargetGroup", properties),
    )?;
    Ok(TargetGroup { id })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Http => "HTTP",
            Protocol::Https => "HTTPS",
        }
    }
}

#[derive(Debug, Clone)]
pub enum ListenerAction {
    Forward(TargetGroup),
    Redirect {
        protocol: Protocol,
        port: u16,
        permanent: bool,
    },
}

impl ListenerAction {
    fn render(&self) -> Value {
        match self {
            ListenerAction::Forward(target_group) => json!({
                "Type": "forward",
                "TargetGroupArn": target_group.arn(),
            }),
            ListenerAction::Redirect {
                protocol,
                port,
                permanent,
            } => json!({
                "Type": "redirect",
                "RedirectConfig": {
                    "Protocol": protocol.as_str(),
                    "Port": port.to_string(),
                    "StatusCode": if *permanent { "HTTP_301" } else { "HTTP_302" },
                },
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ListenerProps {
    pub port: u16,
    pub protocol: Protocol,
    pub certificates: Vec<Value>,
    pub ssl_policy: Option<String>,
    pub default_action: ListenerAction,
}

impl ListenerProps {
    /// Plain HTTP listener forwarding everything to `target_group`
    pub fn http_forward(port: u16, target_group: &TargetGroup) -> Self {
        Self {
            port,
            protocol: Protocol::Http,
            certificates: Vec::new(),
            ssl_policy: None,
            default_action: ListenerAction::Forward(target_group.clone()),
        }
    }
}

pub fn add_listener(
    stack: &mut Stack,
    load_balancer: &LoadBalancer,
    id: &str,
    props: &ListenerProps,
) -> Result<LogicalId, SynthError> {
    if props.protocol == Protocol::Https && props.certificates.is_empty() {
        return Err(SynthError::InvalidNetwork(format!(
            "HTTPS listener '{}' needs at least one certificate",
            id
        )));
    }

    let mut properties = json!({
        "LoadBalancerArn": load_balancer.arn(),
        "Port": props.port,
        "Protocol": props.protocol.as_str(),
        "DefaultActions": [props.default_action.render()],
    });
    if !props.certificates.is_empty() {
        properties["Certificates"] = Value::Array(
            props
                .certificates
                .iter()
                .map(|arn| json!({ "CertificateArn": arn }))
                .collect(),
        );
    }
    if let Some(policy) = &props.ssl_policy {
        properties["SslPolicy"] = json!(policy);
    }

    // Listeners live under the balancer's construct path
    let lb_path = load_balancer.id.as_str();
    stack.add_resource(
        &format!("{}/{}/Resource", lb_path, id),
        Resource::new("AWS::ElasticLoadBalancingV2::Listener", properties),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constructs::network::{add_vpc, VpcProps, DEFAULT_VPC_CIDR};
    use crate::stack::StackEnv;

    fn setup() -> (Stack, Vpc) {
        let mut stack = Stack::new("ElbStack", StackEnv::new(None, "ap-northeast-1"), "d");
        let vpc = add_vpc(
            &mut stack,
            "Vpc",
            &VpcProps {
                vpc_name: "vpc".to_string(),
                cidr: DEFAULT_VPC_CIDR.to_string(),
                max_azs: 2,
                nat_gateways: 1,
            },
        )
        .unwrap();
        (stack, vpc)
    }

    fn health_check() -> HealthCheck {
        HealthCheck {
            path: "/".to_string(),
            interval_secs: 30,
            timeout_secs: 5,
            healthy_threshold: None,
            unhealthy_threshold: None,
            healthy_http_codes: "200".to_string(),
        }
    }

    #[test]
    fn test_internet_facing_lb_waits_for_public_routes() {
        let (mut stack, vpc) = setup();
        let lb = add_load_balancer(
            &mut stack,
            "LB",
            &vpc,
            &LoadBalancerProps {
                load_balancer_name: "lb".to_string(),
                internet_facing: true,
                security_groups: Vec::new(),
                idle_timeout_secs: Some(60),
            },
        )
        .unwrap();
        let resource = stack.resource(&lb.id).unwrap();
        assert_eq!(resource.properties["Scheme"], "internet-facing");
        assert_eq!(resource.depends_on.len(), vpc.internet_routes.len());
        assert_eq!(
            resource.properties["LoadBalancerAttributes"][1]["Value"],
            "60"
        );
    }

    #[test]
    fn test_target_group_deregistration_delay() {
        let (mut stack, vpc) = setup();
        let tg = add_target_group(
            &mut stack,
            "Target",
            &vpc,
            &TargetGroupProps {
                port: 80,
                health_check: health_check(),
                deregistration_delay_secs: Some(30),
            },
        )
        .unwrap();
        let resource = stack.resource(&tg.id).unwrap();
        assert_eq!(resource.properties["TargetType"], "ip");
        assert_eq!(
            resource.properties["TargetGroupAttributes"][0],
            json!({"Key": "deregistration_delay.timeout_seconds", "Value": "30"})
        );
        assert!(resource.property("HealthyThresholdCount").is_none());
    }

    #[test]
    fn test_redirect_listener_is_permanent() {
        let (mut stack, vpc) = setup();
        let lb = add_load_balancer(
            &mut stack,
            "LB",
            &vpc,
            &LoadBalancerProps {
                load_balancer_name: "lb".to_string(),
                internet_facing: true,
                security_groups: Vec::new(),
                idle_timeout_secs: None,
            },
        )
        .unwrap();
        let listener = add_listener(
            &mut stack,
            &lb,
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
        )
        .unwrap();
        let action = &stack.resource(&listener).unwrap().properties["DefaultActions"][0];
        assert_eq!(action["Type"], "redirect");
        assert_eq!(action["RedirectConfig"]["StatusCode"], "HTTP_301");
        assert_eq!(action["RedirectConfig"]["Port"], "443");
    }

    #[test]
    fn test_https_listener_requires_certificate() {
        let (mut stack, vpc) = setup();
        let lb = add_load_balancer(
            &mut stack,
            "LB",
            &vpc,
            &LoadBalancerProps {
                load_balancer_name: "lb".to_string(),
                internet_facing: true,
                security_groups: Vec::new(),
                idle_timeout_secs: None,
            },
        )
        .unwrap();
        let tg = add_target_group(
            &mut stack,
            "Target",
            &vpc,
            &TargetGroupProps {
                port: 80,
                health_check: health_check(),
                deregistration_delay_secs: None,
            },
        )
        .unwrap();
        let mut props = ListenerProps::http_forward(443, &tg);
        props.protocol = Protocol::Https;
        assert!(add_listener(&mut stack, &lb, "HttpsListener", &props).is_err());
    }
}
