use anyhow::{bail, Context, Result};
use aws_config::SdkConfig;
use aws_sdk_cloudformation::types::{Capability, Parameter, Stack as CfnStack};
use aws_sdk_cloudformation::Client as CfnClient;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::format_sdk_error;

/// Largest template CloudFormation accepts inline
pub const MAX_TEMPLATE_BODY_BYTES: usize = 51_200;

const NO_UPDATES_MESSAGE: &str = "No updates are to be performed";

/// Where a stack status leaves the waiting loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    InProgress,
    Complete,
    Failed,
}

pub fn classify_status(status: &str) -> StatusKind {
    if status.ends_with("_IN_PROGRESS") {
        StatusKind::InProgress
    } else if status.ends_with("_FAILED") || status.ends_with("ROLLBACK_COMPLETE") {
        StatusKind::Failed
    } else if status.ends_with("_COMPLETE") {
        StatusKind::Complete
    } else {
        StatusKind::Failed
    }
}

pub fn is_no_updates_error(message: &str) -> bool {
    message.contains(NO_UPDATES_MESSAGE)
}

fn is_missing_stack_error(message: &str) -> bool {
    message.contains("does not exist")
}

/// What `deploy` did to a stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployAction {
    Created,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct DeployedStack {
    pub action: DeployAction,
    pub status: String,
    pub outputs: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
struct StackSnapshot {
    status: String,
    reason: Option<String>,
    outputs: BTreeMap<String, String>,
}

impl From<&CfnStack> for StackSnapshot {
    fn from(stack: &CfnStack) -> Self {
        let outputs = stack
            .outputs()
            .iter()
            .filter_map(|o| Some((o.output_key()?.to_string(), o.output_value()?.to_string())))
            .collect();
        Self {
            status: stack
                .stack_status()
                .map(|s| s.as_str().to_string())
                .unwrap_or_default(),
            reason: stack.stack_status_reason().map(str::to_string),
            outputs,
        }
    }
}

/// Creates or updates stacks in one region and waits for them to settle
pub struct StackDeployer {
    client: CfnClient,
    region: String,
    poll_interval: Duration,
}

impl StackDeployer {
    pub fn new(sdk_config: &SdkConfig, region: &str, poll_interval: Duration) -> Self {
        Self {
            client: CfnClient::new(sdk_config),
            region: region.to_string(),
            poll_interval,
        }
    }

    async fn describe(&self, stack_name: &str) -> Result<Option<StackSnapshot>> {
        match self
            .client
            .describe_stacks()
            .stack_name(stack_name)
            .send()
            .await
        {
            Ok(response) => Ok(response.stacks().first().map(StackSnapshot::from)),
            Err(err) => {
                let message = format_sdk_error(&err);
                if is_missing_stack_error(&message) {
                    return Ok(None);
                }
                Err(anyhow::anyhow!(
                    "Failed to describe stack '{}' in {}: {}",
                    stack_name,
                    self.region,
                    message
                ))
            }
        }
    }

    /// Create the stack if it is absent, update it otherwise
    pub async fn deploy(
        &self,
        stack_name: &str,
        template_body: &str,
        parameters: &BTreeMap<String, String>,
    ) -> Result<DeployedStack> {
        if template_body.len() > MAX_TEMPLATE_BODY_BYTES {
            bail!(
                "Template of {} is {} bytes, over the {} byte inline limit",
                stack_name,
                template_body.len(),
                MAX_TEMPLATE_BODY_BYTES
            );
        }

        let mut existing = self.describe(stack_name).await?;

        // A stack whose creation rolled back cannot be updated, only replaced
        if existing.as_ref().map(|s| s.status.as_str()) == Some("ROLLBACK_COMPLETE") {
            warn!(stack = %stack_name, "Stack is in ROLLBACK_COMPLETE, deleting it first");
            self.delete(stack_name).await?;
            existing = None;
        }

        let parameters: Vec<Parameter> = parameters
            .iter()
            .map(|(key, value)| {
                Parameter::builder()
                    .parameter_key(key)
                    .parameter_value(value)
                    .build()
            })
            .collect();
        let token = format!("cmi-{}", uuid::Uuid::new_v4());
        let started = Utc::now();

        let action = match existing {
            None => {
                info!(stack = %stack_name, region = %self.region, "Creating stack");
                self.client
                    .create_stack()
                    .stack_name(stack_name)
                    .template_body(template_body)
                    .set_parameters(Some(parameters))
                    .capabilities(Capability::CapabilityIam)
                    .capabilities(Capability::CapabilityNamedIam)
                    .client_request_token(&token)
                    .send()
                    .await
                    .map_err(|e| {
                        anyhow::anyhow!(
                            "Failed to create stack '{}': {}",
                            stack_name,
                            format_sdk_error(&e)
                        )
                    })?;
                DeployAction::Created
            }
            Some(current) => {
                if classify_status(&current.status) == StatusKind::InProgress {
                    bail!(
                        "Stack '{}' is busy ({}); wait for it to finish first",
                        stack_name,
                        current.status
                    );
                }

                info!(stack = %stack_name, region = %self.region, "Updating stack");
                let result = self
                    .client
                    .update_stack()
                    .stack_name(stack_name)
                    .template_body(template_body)
                    .set_parameters(Some(parameters))
                    .capabilities(Capability::CapabilityIam)
                    .capabilities(Capability::CapabilityNamedIam)
                    .client_request_token(&token)
                    .send()
                    .await;

                match result {
                    Ok(_) => DeployAction::Updated,
                    Err(err) => {
                        let message = format_sdk_error(&err);
                        if !is_no_updates_error(&message) {
                            bail!("Failed to update stack '{}': {}", stack_name, message);
                        }
                        info!(stack = %stack_name, "No changes");
                        return Ok(DeployedStack {
                            action: DeployAction::Unchanged,
                            status: current.status,
                            outputs: current.outputs,
                        });
                    }
                }
            }
        };

        let settled = self.wait(stack_name, started).await?;
        Ok(DeployedStack {
            action,
            status: settled.status,
            outputs: settled.outputs,
        })
    }

    async fn delete(&self, stack_name: &str) -> Result<()> {
        let started = Utc::now();
        self.client
            .delete_stack()
            .stack_name(stack_name)
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "Failed to delete stack '{}': {}",
                    stack_name,
                    format_sdk_error(&e)
                )
            })?;

        let mut interval = tokio::time::interval(self.poll_interval);
        loop {
            interval.tick().await;
            match self.describe(stack_name).await? {
                None => break,
                Some(s) if s.status == "DELETE_COMPLETE" => break,
                Some(s) if s.status == "DELETE_FAILED" => {
                    bail!(
                        "Failed to delete stack '{}': {}",
                        stack_name,
                        s.reason.unwrap_or_else(|| s.status.clone())
                    );
                }
                Some(s) => debug!(stack = %stack_name, status = %s.status, "Waiting for deletion"),
            }
        }
        info!(
            stack = %stack_name,
            elapsed_secs = (Utc::now() - started).num_seconds(),
            "Deleted stack"
        );
        Ok(())
    }

    /// Poll until the stack leaves its in-progress state
    async fn wait(&self, stack_name: &str, started: DateTime<Utc>) -> Result<StackSnapshot> {
        let mut interval = tokio::time::interval(self.poll_interval);
        let mut last_status = String::new();

        loop {
            interval.tick().await;
            let snapshot = self
                .describe(stack_name)
                .await?
                .with_context(|| format!("Stack '{}' disappeared while deploying", stack_name))?;

            if snapshot.status != last_status {
                info!(
                    stack = %stack_name,
                    status = %snapshot.status,
                    elapsed_secs = (Utc::now() - started).num_seconds(),
                    "Stack status"
                );
                last_status = snapshot.status.clone();
            }

            match classify_status(&snapshot.status) {
                StatusKind::InProgress => continue,
                StatusKind::Complete => return Ok(snapshot),
                StatusKind::Failed => {
                    let causes = self.failure_causes(stack_name, started).await;
                    bail!(
                        "Stack '{}' ended in {}{}{}",
                        stack_name,
                        snapshot.status,
                        snapshot
                            .reason
                            .as_deref()
                            .map(|r| format!(": {}", r))
                            .unwrap_or_default(),
                        causes
                            .iter()
                            .map(|c| format!("\n  {}", c))
                            .collect::<String>()
                    );
                }
            }
        }
    }

    /// Resource failures recorded since `since`, oldest first
    async fn failure_causes(&self, stack_name: &str, since: DateTime<Utc>) -> Vec<String> {
        let response = match self
            .client
            .describe_stack_events()
            .stack_name(stack_name)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                warn!("Could not read stack events: {}", format_sdk_error(&err));
                return Vec::new();
            }
        };

        let mut causes: Vec<String> = response
            .stack_events()
            .iter()
            .filter(|e| e.timestamp().map(|t| t.secs() >= since.timestamp()).unwrap_or(false))
            .filter(|e| {
                e.resource_status()
                    .map(|s| s.as_str().ends_with("_FAILED"))
                    .unwrap_or(false)
            })
            .map(|e| {
                format!(
                    "{}: {}",
                    e.logical_resource_id().unwrap_or("?"),
                    e.resource_status_reason().unwrap_or("no reason given")
                )
            })
            .collect();
        causes.reverse();
        causes
    }
}
