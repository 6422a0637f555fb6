use anyhow::Result;
use std::path::Path;
use tracing::info;

use crate::app::describe_env;
use crate::cli::Workspace;
use crate::settings::TemplateFormat;

/// Synthesize every stack into the output directory
pub fn synth(workspace: &Workspace, out: Option<&Path>, format: Option<TemplateFormat>) -> Result<()> {
    let app = workspace.app()?;
    let out_dir = workspace.out_dir(out);
    let format = workspace.format(format);

    info!(
        env = %describe_env(&workspace.settings.stack_env()),
        out_dir = %out_dir.display(),
        %format,
        "Synthesizing {} stack(s)",
        app.stacks().len()
    );
    let manifest = app.synth(&out_dir, format)?;

    println!("Synthesized to {}", out_dir.display());
    for stack in &manifest.stacks {
        println!("  {} ({})", stack.template_file, stack.region);
    }
    Ok(())
}
