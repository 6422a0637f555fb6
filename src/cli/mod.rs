pub mod check_config;
pub mod context;
#[cfg(feature = "aws")]
pub mod deploy;
pub mod diff;
pub mod list;
pub mod synth;

use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};

use crate::app::App;
use crate::context::Context;
use crate::settings::{Settings, TemplateFormat};

/// Settings, lookup context and the paths derived from them, loaded once per command
pub struct Workspace {
    pub settings: Settings,
    pub context: Context,
    pub context_path: PathBuf,
}

impl Workspace {
    pub fn load() -> Result<Self> {
        let settings = Settings::new().context("Failed to load configuration")?;
        let context_path = PathBuf::from(&settings.output.context_file);
        let context = Context::load(&context_path)?;
        Ok(Self {
            settings,
            context,
            context_path,
        })
    }

    pub fn app(&self) -> Result<App> {
        App::from_settings(&self.settings, &self.context).context("Synthesis failed")
    }

    /// `--out` wins over `[output] dir`
    pub fn out_dir(&self, out: Option<&Path>) -> PathBuf {
        out.map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(&self.settings.output.dir))
    }

    pub fn format(&self, format: Option<TemplateFormat>) -> TemplateFormat {
        format.unwrap_or(self.settings.output.format)
    }
}
