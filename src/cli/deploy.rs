use anyhow::{bail, Context, Result};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Attribute, Cell, Table};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;

use crate::app::{wire_parameters, StackOutputs};
use crate::aws::cloudformation::{DeployAction, StackDeployer};
use crate::aws::{sdk_config, sts};
use crate::cli::Workspace;

/// Deploy the named stacks (and what they depend on) one after another
pub async fn deploy(workspace: &Workspace, stack_names: &[String]) -> Result<()> {
    let app = workspace.app()?;
    let plan = app.deploy_plan(stack_names)?;
    let settings = &workspace.settings;

    let home_config = sdk_config(&settings.env.region).await;
    let account = sts::caller_account(&home_config)
        .await
        .context("Failed to resolve the target account")?;
    if let Some(configured) = &settings.env.account {
        if configured != &account {
            bail!(
                "Credentials belong to account {} but the configuration targets {}",
                account,
                configured
            );
        }
    }
    info!(
        account = %account,
        stacks = plan.len(),
        "Deploying {}",
        plan.iter().map(|s| s.name()).collect::<Vec<_>>().join(", ")
    );

    let poll_interval = Duration::from_secs(settings.deploy.poll_interval_secs);
    let mut deployers: BTreeMap<String, StackDeployer> = BTreeMap::new();
    let mut outputs = StackOutputs::new();
    let mut results = Vec::new();

    for stack in plan {
        let region = stack.env().region.clone();
        if !deployers.contains_key(&region) {
            let config = if region == settings.env.region {
                home_config.clone()
            } else {
                sdk_config(&region).await
            };
            deployers.insert(
                region.clone(),
                StackDeployer::new(&config, &region, poll_interval),
            );
        }
        let Some(deployer) = deployers.get(&region) else {
            bail!("No CloudFormation client for region {}", region);
        };

        let parameters = wire_parameters(stack, &outputs)?;
        // Compact JSON keeps large templates under the inline size limit
        let body = serde_json::to_string(stack.template())
            .with_context(|| format!("Failed to serialize template of {}", stack.name()))?;
        let deployed = deployer.deploy(stack.name(), &body, &parameters).await?;

        let action = match deployed.action {
            DeployAction::Created => "created",
            DeployAction::Updated => "updated",
            DeployAction::Unchanged => "unchanged",
        };
        println!("✓ {} {} ({})", stack.name(), action, deployed.status);
        results.push((stack.name().to_string(), deployed.outputs.clone()));
        outputs.insert(stack.name().to_string(), deployed.outputs);
    }

    print_outputs(&results);
    Ok(())
}

fn print_outputs(results: &[(String, BTreeMap<String, String>)]) {
    if results.iter().all(|(_, outputs)| outputs.is_empty()) {
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("STACK").add_attribute(Attribute::Bold),
            Cell::new("OUTPUT").add_attribute(Attribute::Bold),
            Cell::new("VALUE").add_attribute(Attribute::Bold),
        ]);

    for (stack, outputs) in results {
        for (key, value) in outputs {
            table.add_row(vec![Cell::new(stack), Cell::new(key), Cell::new(value)]);
        }
    }
    println!("{}", table);
}
