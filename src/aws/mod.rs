pub mod cloudformation;
pub mod route53;
pub mod sts;

use aws_config::{BehaviorVersion, SdkConfig};

/// Shared SDK configuration for one region, using the default credential chain
pub async fn sdk_config(region: &str) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(aws_config::Region::new(region.to_string()))
        .load()
        .await
}

/// Extract a clean error message from an AWS SDK error's Debug output
///
/// The AWS SDK errors have verbose Debug output, but the meaningful part is
/// the `message: Some("...")` field.
pub(crate) fn format_sdk_error<E: std::fmt::Debug>(err: &E) -> String {
    let debug_str = format!("{:?}", err);

    if let Some(start) = debug_str.find("message: Some(\"") {
        let start = start + "message: Some(\"".len();
        if let Some(end) = debug_str[start..].find("\")") {
            return debug_str[start..start + end].to_string();
        }
    }

    // Query protocol errors carry the message as XML
    if let Some(start) = debug_str.find("<Message>") {
        let start = start + "<Message>".len();
        if let Some(end) = debug_str[start..].find("</Message>") {
            return debug_str[start..start + end].to_string();
        }
    }

    if debug_str.chars().count() > 200 {
        format!("{}...", debug_str.chars().take(200).collect::<String>())
    } else {
        debug_str
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    #[allow(dead_code)]
    struct FakeError {
        message: Option<String>,
    }

    #[test]
    fn test_format_sdk_error_extracts_message() {
        let err = FakeError {
            message: Some("No updates are to be performed.".to_string()),
        };
        assert_eq!(format_sdk_error(&err), "No updates are to be performed.");
    }

    #[test]
    fn test_format_sdk_error_xml_message() {
        let raw = "<ErrorResponse><Error><Message>Stack with id X does not exist</Message></Error></ErrorResponse>";
        assert_eq!(format_sdk_error(&raw), "Stack with id X does not exist");
    }

    #[test]
    fn test_format_sdk_error_truncates() {
        let long = "x".repeat(500);
        assert_eq!(format_sdk_error(&long).chars().count(), 203);
    }
}
