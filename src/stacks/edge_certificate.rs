use crate::constructs::dns::{add_dns_validated_certificate, HostedZone};
use crate::error::SynthError;
use crate::stack::{Stack, StackEnv};
use crate::template::Output;

/// CloudFront only accepts certificates issued in this region
pub const EDGE_REGION: &str = "us-east-1";

/// Output of the edge stack the prod stack's parameter is filled from
pub const CERTIFICATE_ARN_OUTPUT: &str = "CertificateArn";

/// `CalculatorMergerProdStack` → `CalculatorMergerProdEdgeCertificateStack`
pub fn edge_stack_name(prod_stack_name: &str) -> String {
    let base = prod_stack_name
        .strip_suffix("Stack")
        .unwrap_or(prod_stack_name);
    format!("{}EdgeCertificateStack", base)
}

/// Certificate for the CDN alias, pinned to us-east-1
pub fn edge_certificate_stack(
    env: &StackEnv,
    stack_name: &str,
    domain_name: &str,
    zone: &HostedZone,
) -> Result<Stack, SynthError> {
    let mut stack = Stack::new(
        stack_name,
        env.in_region(EDGE_REGION),
        &format!("CloudFront certificate for {}", domain_name),
    );

    let certificate =
        add_dns_validated_certificate(&mut stack, "CloudFrontCertificate", domain_name, zone)?;
    stack.add_output(
        CERTIFICATE_ARN_OUTPUT,
        Output::new(certificate.arn(), "ARN of the CloudFront certificate"),
    );

    Ok(stack)
}
