// The set of stacks one invocation synthesizes
//
// Stacks are kept in deployment order. Every stack only depends on stacks
// that come before it.

use anyhow::{bail, Context as _, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::constructs::dns::parent_zone_name;
use crate::context::Context;
use crate::error::SynthError;
use crate::settings::{Settings, TemplateFormat};
use crate::stack::{Stack, StackEnv};
use crate::stacks::base::{base_stack, BASE_STACK_NAME};
use crate::stacks::dev::{dev_stack, DevStackProps};
use crate::stacks::edge_certificate::{
    edge_certificate_stack, edge_stack_name, CERTIFICATE_ARN_OUTPUT,
};
use crate::stacks::prod::{prod_stack, ProdDomain, ProdStackProps, CERTIFICATE_PARAMETER};
use crate::template::Template;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MANIFEST_VERSION: u32 = 1;

/// Index of a synthesized output directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub stacks: Vec<ManifestStack>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestStack {
    pub name: String,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    pub template_file: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

pub struct App {
    stacks: Vec<Stack>,
}

impl App {
    /// Hosted zones the configured domain needs from the lookup context
    pub fn required_zones(settings: &Settings) -> Vec<String> {
        match settings.prod.domain() {
            Some(domain) if settings.prod.enabled => vec![parent_zone_name(domain)],
            _ => Vec::new(),
        }
    }

    pub fn from_settings(settings: &Settings, context: &Context) -> Result<Self, SynthError> {
        let env = settings.stack_env();
        let mut stacks = vec![base_stack(&env)?];

        // Resolve the zone before building anything domain related so a
        // missing context entry fails fast
        let domain = match settings.prod.domain() {
            Some(domain_name) if settings.prod.enabled => {
                let zone = context.hosted_zone(&parent_zone_name(domain_name))?;
                Some(ProdDomain {
                    domain_name: domain_name.to_string(),
                    zone,
                    edge_stack_name: edge_stack_name(&settings.prod.stack_name),
                })
            }
            _ => None,
        };

        if let Some(domain) = &domain {
            stacks.push(edge_certificate_stack(
                &env,
                &domain.edge_stack_name,
                &domain.domain_name,
                &domain.zone,
            )?);
        }

        if settings.dev.enabled {
            stacks.push(environment_stack(dev_stack(
                &env,
                &DevStackProps {
                    stack_name: settings.dev.stack_name.clone(),
                    stage: settings.dev.stage.clone(),
                },
            )?));
        }

        if settings.prod.enabled {
            stacks.push(environment_stack(prod_stack(
                &env,
                &ProdStackProps {
                    stack_name: settings.prod.stack_name.clone(),
                    stage: settings.prod.stage.clone(),
                    domain,
                },
            )?));
        }

        Ok(Self::from_stacks(stacks))
    }

    pub fn from_stacks(stacks: Vec<Stack>) -> Self {
        Self { stacks }
    }

    pub fn stacks(&self) -> &[Stack] {
        &self.stacks
    }

    pub fn stack(&self, name: &str) -> Option<&Stack> {
        self.stacks.iter().find(|s| s.name() == name)
    }

    /// The named stacks plus everything they depend on, in deployment order.
    /// No names selects every stack.
    pub fn deploy_plan(&self, names: &[String]) -> Result<Vec<&Stack>> {
        if names.is_empty() {
            return Ok(self.stacks.iter().collect());
        }

        let mut selected = BTreeSet::new();
        let mut pending: Vec<String> = names.to_vec();
        while let Some(name) = pending.pop() {
            let Some(stack) = self.stack(&name) else {
                bail!(
                    "Unknown stack '{}'. Available stacks: {}",
                    name,
                    self.stack_names().join(", ")
                );
            };
            if selected.insert(name) {
                pending.extend(stack.dependencies().iter().cloned());
            }
        }

        Ok(self
            .stacks
            .iter()
            .filter(|s| selected.contains(s.name()))
            .collect())
    }

    pub fn stack_names(&self) -> Vec<&str> {
        self.stacks.iter().map(|s| s.name()).collect()
    }

    /// Write every template plus the manifest into `out_dir`
    pub fn synth(&self, out_dir: &Path, format: TemplateFormat) -> Result<Manifest> {
        fs::create_dir_all(out_dir)
            .with_context(|| format!("Failed to create output directory {}", out_dir.display()))?;

        let mut manifest = Manifest {
            version: MANIFEST_VERSION,
            stacks: Vec::new(),
        };

        for stack in &self.stacks {
            let file_name = template_file_name(stack.name(), format);
            let path = out_dir.join(&file_name);
            fs::write(&path, render_template(stack.template(), format)?)
                .with_context(|| format!("Failed to write template {}", path.display()))?;
            info!(
                stack = %stack.name(),
                region = %stack.env().region,
                resources = stack.template().resources.len(),
                "Wrote {}",
                path.display()
            );

            manifest.stacks.push(ManifestStack {
                name: stack.name().to_string(),
                region: stack.env().region.clone(),
                account: stack.env().account.clone(),
                template_file: file_name,
                dependencies: stack.dependencies().to_vec(),
            });
        }

        let manifest_path = out_dir.join(MANIFEST_FILE);
        let mut content =
            serde_json::to_string_pretty(&manifest).context("Failed to serialize manifest")?;
        content.push('\n');
        fs::write(&manifest_path, content)
            .with_context(|| format!("Failed to write {}", manifest_path.display()))?;
        debug!("Wrote {}", manifest_path.display());

        Ok(manifest)
    }
}

/// Stack outputs keyed by stack name, then output name
pub type StackOutputs = BTreeMap<String, BTreeMap<String, String>>;

/// Fill a stack's template parameters from the outputs of the stacks it depends on
pub fn wire_parameters(stack: &Stack, outputs: &StackOutputs) -> Result<BTreeMap<String, String>> {
    let mut values = BTreeMap::new();
    for name in stack.template().parameters.keys() {
        let source = match name.as_str() {
            CERTIFICATE_PARAMETER => CERTIFICATE_ARN_OUTPUT,
            other => bail!("Stack {} has parameter {} with no known source", stack.name(), other),
        };

        let value = stack
            .dependencies()
            .iter()
            .filter_map(|dep| outputs.get(dep))
            .find_map(|out| out.get(source))
            .with_context(|| {
                format!(
                    "Parameter {} of {} needs output {} of a dependency, which is not deployed yet",
                    name,
                    stack.name(),
                    source
                )
            })?;
        values.insert(name.clone(), value.clone());
    }
    Ok(values)
}

/// Environment stacks pull their image from the base stack's repository
fn environment_stack(mut stack: Stack) -> Stack {
    stack.add_dependency(BASE_STACK_NAME);
    stack
}

pub fn template_file_name(stack_name: &str, format: TemplateFormat) -> String {
    format!("{}.template.{}", stack_name, format.extension())
}

pub fn render_template(template: &Template, format: TemplateFormat) -> Result<String> {
    let mut rendered = match format {
        TemplateFormat::Json => {
            serde_json::to_string_pretty(template).context("Failed to serialize template")?
        }
        TemplateFormat::Yaml => {
            serde_yaml::to_string(template).context("Failed to serialize template")?
        }
    };
    if !rendered.ends_with('\n') {
        rendered.push('\n');
    }
    Ok(rendered)
}

/// Read a previously written template, choosing the parser by extension
pub fn load_template(path: &Path) -> Result<Template> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read template {}", path.display()))?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    if is_yaml {
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse template {}", path.display()))
    } else {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse template {}", path.display()))
    }
}

/// Path of a stack's template in `out_dir`, if one was written in either format
pub fn existing_template_path(out_dir: &Path, stack_name: &str) -> Option<PathBuf> {
    [TemplateFormat::Json, TemplateFormat::Yaml]
        .into_iter()
        .map(|format| out_dir.join(template_file_name(stack_name, format)))
        .find(|path| path.exists())
}

/// Environment every stack of the app is synthesized for
pub fn describe_env(env: &StackEnv) -> String {
    format!(
        "{}/{}",
        env.account.as_deref().unwrap_or("unknown-account"),
        env.region
    )
}
