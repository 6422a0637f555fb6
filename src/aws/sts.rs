use anyhow::{Context, Result};
use aws_config::SdkConfig;
use aws_sdk_sts::Client as StsClient;

use super::format_sdk_error;

/// Account the current credentials belong to
pub async fn caller_account(sdk_config: &SdkConfig) -> Result<String> {
    let identity = StsClient::new(sdk_config)
        .get_caller_identity()
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("GetCallerIdentity failed: {}", format_sdk_error(&e)))?;

    identity
        .account()
        .map(str::to_string)
        .context("GetCallerIdentity returned no account")
}
