use anyhow::Result;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Attribute, Cell, Table};

use crate::app::{describe_env, App};
use crate::cli::Workspace;
use crate::stacks::edge_certificate::edge_stack_name;

/// Validate the configuration and print what would be synthesized.
///
/// Loading already validates; this also checks that the lookup context
/// covers the configured domain.
pub fn check_config(workspace: &Workspace) -> Result<()> {
    let settings = &workspace.settings;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("SETTING").add_attribute(Attribute::Bold),
            Cell::new("VALUE").add_attribute(Attribute::Bold),
        ]);

    let enabled = |on: bool| if on { "enabled" } else { "disabled" };
    let rows = [
        ("env", describe_env(&settings.stack_env())),
        (
            "dev",
            format!(
                "{} (stage {}, {})",
                settings.dev.stack_name,
                settings.dev.stage,
                enabled(settings.dev.enabled)
            ),
        ),
        (
            "prod",
            format!(
                "{} (stage {}, {})",
                settings.prod.stack_name,
                settings.prod.stage,
                enabled(settings.prod.enabled)
            ),
        ),
        (
            "prod domain",
            match settings.prod.domain() {
                Some(domain) => format!(
                    "{} (edge stack {})",
                    domain,
                    edge_stack_name(&settings.prod.stack_name)
                ),
                None => "-".to_string(),
            },
        ),
        (
            "output",
            format!("{} ({})", settings.output.dir, settings.output.format),
        ),
        ("context file", workspace.context_path.display().to_string()),
        (
            "deploy poll interval",
            format!("{}s", settings.deploy.poll_interval_secs),
        ),
    ];
    for (name, value) in rows {
        table.add_row(vec![Cell::new(name), Cell::new(value)]);
    }
    println!("{}", table);

    let missing: Vec<String> = App::required_zones(settings)
        .into_iter()
        .filter(|zone| !workspace.context.hosted_zones.contains_key(zone))
        .collect();
    if !missing.is_empty() {
        anyhow::bail!(
            "Hosted zone(s) missing from {}: {}. Run 'cmi context lookup'",
            workspace.context_path.display(),
            missing.join(", ")
        );
    }

    let app = workspace.app()?;
    println!("✓ Configuration is valid ({} stacks)", app.stacks().len());
    Ok(())
}
