use anyhow::Result;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Attribute, Cell, Color, Table};
use std::path::Path;
use tracing::debug;

use crate::app::{existing_template_path, load_template};
use crate::cli::Workspace;
use crate::diff::{Change, TemplateDiff};

/// Compare freshly synthesized templates with the ones in the output directory.
///
/// Returns the number of stacks that differ.
pub fn diff_stacks(workspace: &Workspace, out: Option<&Path>) -> Result<usize> {
    let app = workspace.app()?;
    let out_dir = workspace.out_dir(out);
    let mut changed_stacks = 0;

    for stack in app.stacks() {
        let diff = match existing_template_path(&out_dir, stack.name()) {
            Some(path) => {
                debug!("Comparing {} with {}", stack.name(), path.display());
                TemplateDiff::between(&load_template(&path)?, stack.template())
            }
            None => {
                println!("Stack {} (new)", stack.name());
                TemplateDiff::against_nothing(stack.template())
            }
        };

        if diff.is_empty() {
            println!("Stack {}: no differences", stack.name());
            continue;
        }

        changed_stacks += 1;
        println!("Stack {}: {} change(s)", stack.name(), diff.change_count());
        if diff.description_changed {
            println!("  Description changed");
        }
        print_section("RESOURCE", &diff.resources);
        print_section("PARAMETER", &diff.parameters);
        print_section("OUTPUT", &diff.outputs);
    }

    if changed_stacks == 0 {
        println!("No differences");
    }
    Ok(changed_stacks)
}

fn print_section(kind: &str, changes: &std::collections::BTreeMap<String, Change>) {
    if changes.is_empty() {
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new(kind).add_attribute(Attribute::Bold),
            Cell::new("CHANGE").add_attribute(Attribute::Bold),
        ]);

    for (name, change) in changes {
        let color = match change {
            Change::Added => Color::Green,
            Change::Removed | Change::Replaced { .. } => Color::Red,
            Change::Modified(_) => Color::Yellow,
        };
        table.add_row(vec![Cell::new(name), Cell::new(change).fg(color)]);
    }

    println!("{}", table);
}
