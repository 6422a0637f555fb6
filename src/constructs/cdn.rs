use serde_json::{json, Value};

use crate::error::SynthError;
use crate::stack::Stack;
use crate::template::{DeletionPolicy, LogicalId, Resource};

/// Managed `CachingDisabled` cache policy
pub const CACHING_DISABLED_POLICY_ID: &str = "4135ea2d-6df8-44a3-9df3-4b5a84be39ad";

/// Managed `AllViewer` origin request policy
pub const ALL_VIEWER_POLICY_ID: &str = "216adef6-5c7f-47e4-b989-5492eafa07d3";

#[derive(Debug, Clone)]
pub struct Bucket {
    pub id: LogicalId,
}

impl Bucket {
    pub fn regional_domain_name(&self) -> Value {
        self.id.attr("RegionalDomainName")
    }
}

/// Bucket receiving CloudFront standard logs.
///
/// CloudFront writes logs through object ACLs, so the bucket keeps
/// `ObjectWriter` ownership instead of the bucket-owner-enforced default.
pub fn add_log_bucket(
    stack: &mut Stack,
    id: &str,
    removal_policy: DeletionPolicy,
) -> Result<Bucket, SynthError> {
    let id = stack.add_resource(
        &format!("{}/Resource", id),
        Resource::new(
            "AWS::S3::Bucket",
            json!({
                "OwnershipControls": {
                    "Rules": [{ "ObjectOwnership": "ObjectWriter" }],
                },
            }),
        )
        .with_removal_policy(removal_policy),
    )?;
    Ok(Bucket { id })
}

#[derive(Debug, Clone)]
pub struct DistributionProps {
    /// Host name of the HTTP-only custom origin
    pub origin_domain: Value,
    pub aliases: Vec<String>,
    /// ACM certificate in us-east-1
    pub certificate_arn: Value,
    pub log_bucket: Bucket,
    pub log_prefix: String,
}

/// Non-caching distribution in front of a load balancer, HTTPS-only for viewers
pub fn add_distribution(
    stack: &mut Stack,
    id: &str,
    props: &DistributionProps,
) -> Result<LogicalId, SynthError> {
    let origin_id = LogicalId::from_path(&stack.path_of(&format!("{}/Origin1", id)));

    let config = json!({
        "Enabled": true,
        "HttpVersion": "http2",
        "IPV6Enabled": true,
        "Aliases": props.aliases,
        "Origins": [{
            "Id": origin_id.as_str(),
            "DomainName": props.origin_domain,
            "CustomOriginConfig": {
                "OriginProtocolPolicy": "http-only",
                "OriginSSLProtocols": ["TLSv1.2"],
            },
        }],
        "DefaultCacheBehavior": {
            "TargetOriginId": origin_id.as_str(),
            "ViewerProtocolPolicy": "redirect-to-https",
            "AllowedMethods": ["GET", "HEAD", "OPTIONS", "PUT", "PATCH", "POST", "DELETE"],
            "CachedMethods": ["GET", "HEAD"],
            "CachePolicyId": CACHING_DISABLED_POLICY_ID,
            "OriginRequestPolicyId": ALL_VIEWER_POLICY_ID,
            "Compress": true,
        },
        "ViewerCertificate": {
            "AcmCertificateArn": props.certificate_arn,
            "MinimumProtocolVersion": "TLSv1.2_2021",
            "SslSupportMethod": "sni-only",
        },
        "Logging": {
            "Bucket": props.log_bucket.regional_domain_name(),
            "Prefix": props.log_prefix,
        },
    });

    stack.add_resource(
        &format!("{}/Resource", id),
        Resource::new(
            "AWS::CloudFront::Distribution",
            json!({ "DistributionConfig": config }),
        ),
    )
}
