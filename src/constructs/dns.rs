use serde_json::json;

use crate::error::SynthError;
use crate::stack::Stack;
use crate::template::intrinsics::{join, lit};
use crate::template::{LogicalId, Resource};

use super::elb::LoadBalancer;

/// Zone assumed to host `domain`: its last two dot-separated labels.
///
/// `calculator-merger.example.com` → `example.com`. Multi-label public
/// suffixes such as `co.uk` resolve to the suffix itself.
pub fn parent_zone_name(domain: &str) -> String {
    let labels: Vec<&str> = domain.trim_end_matches('.').split('.').collect();
    let start = labels.len().saturating_sub(2);
    labels[start..].join(".")
}

/// Hosted zone resolved from the lookup context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedZone {
    pub zone_id: String,
    pub zone_name: String,
}

#[derive(Debug, Clone)]
pub struct Certificate {
    pub id: LogicalId,
}

impl Certificate {
    pub fn arn(&self) -> serde_json::Value {
        self.id.reference()
    }
}

/// ACM certificate for `domain_name`, validated through records in `zone`
pub fn add_dns_validated_certificate(
    stack: &mut Stack,
    id: &str,
    domain_name: &str,
    zone: &HostedZone,
) -> Result<Certificate, SynthError> {
    let name = stack.path_of(id);
    let id = stack.add_resource(
        &format!("{}/Resource", id),
        Resource::new(
            "AWS::CertificateManager::Certificate",
            json!({
                "DomainName": domain_name,
                "DomainValidationOptions": [{
                    "DomainName": domain_name,
                    "HostedZoneId": zone.zone_id,
                }],
                "ValidationMethod": "DNS",
                "Tags": [{ "Key": "Name", "Value": name }],
            }),
        ),
    )?;
    Ok(Certificate { id })
}

/// `A` alias record pointing `record_name` at an application load balancer.
///
/// Alias records take the TTL of their target, so none is declared.
pub fn add_load_balancer_alias(
    stack: &mut Stack,
    id: &str,
    zone: &HostedZone,
    record_name: &str,
    load_balancer: &LoadBalancer,
) -> Result<LogicalId, SynthError> {
    stack.add_resource(
        &format!("{}/Resource", id),
        Resource::new(
            "AWS::Route53::RecordSet",
            json!({
                "Name": format!("{}.", record_name.trim_end_matches('.')),
                "Type": "A",
                "HostedZoneId": zone.zone_id,
                "AliasTarget": {
                    "DNSName": join("", vec![lit("dualstack."), load_balancer.dns_name()]),
                    "HostedZoneId": load_balancer.canonical_hosted_zone_id(),
                },
            }),
        ),
    )
}
