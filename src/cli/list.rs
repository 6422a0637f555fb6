use anyhow::Result;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Attribute, Cell, Table};

use crate::app::describe_env;
use crate::cli::Workspace;

/// List the stacks in deployment order
pub fn list_stacks(workspace: &Workspace) -> Result<()> {
    let app = workspace.app()?;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("#").add_attribute(Attribute::Bold),
            Cell::new("STACK").add_attribute(Attribute::Bold),
            Cell::new("ENV").add_attribute(Attribute::Bold),
            Cell::new("RESOURCES").add_attribute(Attribute::Bold),
            Cell::new("OUTPUTS").add_attribute(Attribute::Bold),
            Cell::new("DEPENDS ON").add_attribute(Attribute::Bold),
        ]);

    for (i, stack) in app.stacks().iter().enumerate() {
        let dependencies = if stack.dependencies().is_empty() {
            "-".to_string()
        } else {
            stack.dependencies().join(", ")
        };

        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(stack.name()),
            Cell::new(describe_env(stack.env())),
            Cell::new(stack.template().resources.len()),
            Cell::new(stack.template().outputs.len()),
            Cell::new(dependencies),
        ]);
    }

    println!("{}", table);
    Ok(())
}
