// Stack definitions: the shared registry, the two service environments,
// and the us-east-1 certificate the production CDN needs.

pub mod base;
pub mod dev;
pub mod edge_certificate;
pub mod prod;
pub mod service_environment;

use regex::Regex;

use crate::error::SynthError;

/// Stage names end up in resource names with tight length limits
/// (load balancer and target group names max out at 32 characters).
const STAGE_PATTERN: &str = r"^[a-z][a-z0-9-]{0,10}$";

pub fn validate_stage(stage: &str) -> Result<(), SynthError> {
    let valid = Regex::new(STAGE_PATTERN)
        .map(|re| re.is_match(stage))
        .unwrap_or(false);
    if valid {
        Ok(())
    } else {
        Err(SynthError::InvalidStageName(stage.to_string()))
    }
}

/// Uppercase the first character: `dev` → `Dev`
pub fn capitalize(stage: &str) -> String {
    let mut chars = stage.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Cross-stack export name, e.g. `CalculatorMergerDevLbDns`
pub fn export_name(stage: &str, suffix: &str) -> String {
    format!("CalculatorMerger{}{}", capitalize(stage), suffix)
}
