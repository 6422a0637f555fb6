use anyhow::Result;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Attribute, Cell, Table};
use tracing::info;

use crate::app::App;
use crate::cli::Workspace;
use crate::context::ZoneLookup;

/// Print the cached lookups and whether the configured domain is covered
pub fn show_context(workspace: &Workspace) -> Result<()> {
    let required = App::required_zones(&workspace.settings);

    if workspace.context.hosted_zones.is_empty() {
        println!("No hosted zones in {}", workspace.context_path.display());
    } else {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new("HOSTED ZONE").add_attribute(Attribute::Bold),
                Cell::new("ZONE ID").add_attribute(Attribute::Bold),
                Cell::new("USED").add_attribute(Attribute::Bold),
            ]);

        for (zone_name, zone_id) in &workspace.context.hosted_zones {
            let used = if required.contains(zone_name) { "yes" } else { "no" };
            table.add_row(vec![Cell::new(zone_name), Cell::new(zone_id), Cell::new(used)]);
        }
        println!("{}", table);
    }

    for zone in required
        .iter()
        .filter(|z| !workspace.context.hosted_zones.contains_key(*z))
    {
        println!("Missing: {} (run 'cmi context lookup' or 'cmi context set')", zone);
    }
    Ok(())
}

/// Record a hosted zone id by hand
pub fn set_zone(workspace: &mut Workspace, zone_name: &str, zone_id: &str) -> Result<()> {
    workspace.context.insert_hosted_zone(zone_name, zone_id);
    workspace.context.save(&workspace.context_path)?;
    println!("✓ Recorded hosted zone {} = {}", zone_name, zone_id);
    Ok(())
}

/// Resolve every zone the current settings need but the context lacks
pub async fn lookup_zones(workspace: &mut Workspace, lookup: &dyn ZoneLookup) -> Result<()> {
    let required = App::required_zones(&workspace.settings);
    if required.is_empty() {
        println!("No hosted zones required by the current configuration");
        return Ok(());
    }

    let added = workspace.context.resolve_missing(&required, lookup).await?;
    if added.is_empty() {
        info!("Context already up to date");
        println!("Nothing to look up");
        return Ok(());
    }

    workspace.context.save(&workspace.context_path)?;
    for zone in &added {
        println!("✓ Resolved hosted zone {}", zone);
    }
    Ok(())
}
