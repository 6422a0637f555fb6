use config::{Config, ConfigError, FileFormat};
use serde::{Deserialize, Deserializer};
use std::env;
use std::fmt;
use std::str::FromStr;

use crate::context::DEFAULT_CONTEXT_FILE;
use crate::stack::StackEnv;
use crate::stacks::validate_stage;

/// Built-in defaults, always loaded first
const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub env: EnvSettings,
    pub dev: DevSettings,
    pub prod: ProdSettings,
    pub output: OutputSettings,
    #[serde(default)]
    pub deploy: DeploySettings,
}

fn default_region() -> String {
    "ap-northeast-1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EnvSettings {
    /// Target account; `None` leaves it to the credentials used at deploy time
    #[serde(default, deserialize_with = "deserialize_account")]
    pub account: Option<String>,

    #[serde(default = "default_region")]
    pub region: String,
}

/// Account ids look numeric, so environment overrides may arrive as numbers
fn deserialize_account<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Account {
        Text(String),
        Number(u64),
    }

    let account = Option::<Account>::deserialize(deserializer)?.map(|a| match a {
        Account::Text(s) => s,
        Account::Number(n) => format!("{:012}", n),
    });
    Ok(account.filter(|a| !a.trim().is_empty()))
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct DevSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub stack_name: String,
    pub stage: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProdSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub stack_name: String,
    pub stage: String,
    /// Custom domain; empty or absent disables HTTPS, DNS and CDN
    #[serde(default)]
    pub domain_name: Option<String>,
}

impl ProdSettings {
    pub fn domain(&self) -> Option<&str> {
        self.domain_name
            .as_deref()
            .map(|d| d.trim().trim_end_matches('.'))
            .filter(|d| !d.is_empty())
    }
}

/// Serialization of written templates
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TemplateFormat {
    #[default]
    Json,
    Yaml,
}

impl TemplateFormat {
    pub fn extension(self) -> &'static str {
        match self {
            TemplateFormat::Json => "json",
            TemplateFormat::Yaml => "yaml",
        }
    }
}

impl FromStr for TemplateFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(TemplateFormat::Json),
            "yaml" | "yml" => Ok(TemplateFormat::Yaml),
            other => Err(format!("unknown template format '{}' (expected json or yaml)", other)),
        }
    }
}

impl fmt::Display for TemplateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

fn default_context_file() -> String {
    DEFAULT_CONTEXT_FILE.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputSettings {
    /// Directory synthesized templates are written to
    pub dir: String,
    #[serde(default)]
    pub format: TemplateFormat,
    #[serde(default = "default_context_file")]
    pub context_file: String,
}

fn default_poll_interval() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeploySettings {
    /// Seconds between DescribeStacks calls while waiting for a stack (default: 10)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
        }
    }
}

impl Settings {
    /// Substitute environment variables in a string value
    /// Replaces ${VAR_NAME} or ${VAR_NAME:-default} with environment variable values
    fn substitute_env_vars_in_string(s: &str) -> String {
        let re = match regex::Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}") {
            Ok(re) => re,
            Err(_) => return s.to_string(),
        };

        re.replace_all(s, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map(|m| m.as_str());

            match env::var(var_name) {
                Ok(val) => val,
                Err(_) => default_value.unwrap_or("").to_string(),
            }
        })
        .to_string()
    }

    /// Convert a config::Value to a serde_json::Value, performing environment variable substitution
    fn config_value_to_json(value: &config::Value) -> serde_json::Value {
        use config::ValueKind;

        match &value.kind {
            ValueKind::Nil => serde_json::Value::Null,
            ValueKind::Boolean(b) => serde_json::Value::Bool(*b),
            ValueKind::I64(i) => serde_json::Value::Number((*i).into()),
            ValueKind::I128(i) => serde_json::Value::Number((*i as i64).into()),
            ValueKind::U64(u) => serde_json::Value::Number((*u).into()),
            ValueKind::U128(u) => serde_json::Value::Number((*u as u64).into()),
            ValueKind::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ValueKind::String(s) => serde_json::Value::String(Self::substitute_env_vars_in_string(s)),
            ValueKind::Table(table) => {
                let mut map = serde_json::Map::new();
                for (k, v) in table.iter() {
                    map.insert(k.clone(), Self::config_value_to_json(v));
                }
                serde_json::Value::Object(map)
            }
            ValueKind::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(Self::config_value_to_json).collect())
            }
        }
    }

    /// Try to add a config file with multiple extension attempts (.toml, .yaml, .yml)
    /// Returns true if a file was loaded
    fn try_add_config_file(
        builder: &mut config::ConfigBuilder<config::builder::DefaultState>,
        config_dir: &str,
        name: &str,
    ) -> bool {
        for ext in ["toml", "yaml", "yml"] {
            let path = format!("{}/{}.{}", config_dir, name, ext);
            if std::path::Path::new(&path).exists() {
                tracing::info!("Loading config file: {}", path);
                *builder = builder
                    .clone()
                    .add_source(config::File::with_name(&format!("{}/{}", config_dir, name)));
                return true;
            }
        }

        tracing::debug!(
            "Optional config file not found: {}/{}.{{toml,yaml,yml}}",
            config_dir,
            name
        );
        false
    }

    /// Load settings from `CMI_CONFIG_DIR` (default `config`) and
    /// `CMI_CONFIG_RUN_MODE` (default `development`)
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("CMI_CONFIG_RUN_MODE").unwrap_or_else(|_| "development".into());
        let config_dir = env::var("CMI_CONFIG_DIR").unwrap_or_else(|_| "config".into());

        let mut settings = Self::load(&config_dir, &run_mode)?;
        settings.apply_cdk_env(
            env::var("CDK_DEFAULT_ACCOUNT").ok(),
            env::var("CDK_DEFAULT_REGION").ok(),
        );
        settings.validate()?;
        Ok(settings)
    }

    /// Layer the embedded defaults, `<config_dir>/<run_mode>`, `<config_dir>/local`
    /// and `CMI_*` environment variables, in that order
    pub fn load(config_dir: &str, run_mode: &str) -> Result<Self, ConfigError> {
        let mut builder =
            Config::builder().add_source(config::File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        Self::try_add_config_file(&mut builder, config_dir, run_mode);
        Self::try_add_config_file(&mut builder, config_dir, "local");

        builder = builder.add_source(
            config::Environment::with_prefix("CMI")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let root_value = config
            .cache
            .into_table()
            .map_err(|e| ConfigError::Message(format!("Failed to get config table: {}", e)))?;

        let mut json_map = serde_json::Map::new();
        for (k, v) in root_value.iter() {
            json_map.insert(k.clone(), Self::config_value_to_json(v));
        }
        let json_value = serde_json::Value::Object(json_map);

        let mut unused_fields = Vec::new();
        let settings: Settings = serde_ignored::deserialize(json_value, |path| {
            unused_fields.push(path.to_string());
        })
        .map_err(|e| ConfigError::Message(format!("Failed to deserialize settings: {}", e)))?;

        for field in &unused_fields {
            // CMI_CONFIG_DIR and CMI_CONFIG_RUN_MODE also match the environment source
            if field.starts_with("config_") {
                continue;
            }
            tracing::warn!("Unknown configuration field: {}", field);
        }

        Ok(settings)
    }

    /// `CDK_DEFAULT_ACCOUNT` / `CDK_DEFAULT_REGION` win over the config files
    pub fn apply_cdk_env(&mut self, account: Option<String>, region: Option<String>) {
        if let Some(account) = account.filter(|a| !a.trim().is_empty()) {
            self.env.account = Some(account);
        }
        if let Some(region) = region.filter(|r| !r.trim().is_empty()) {
            self.env.region = region;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.env.region.trim().is_empty() {
            return Err(ConfigError::Message(
                "Region not configured. Set CDK_DEFAULT_REGION or [env] region in config"
                    .to_string(),
            ));
        }

        for (section, stage, stack_name) in [
            ("dev", &self.dev.stage, &self.dev.stack_name),
            ("prod", &self.prod.stage, &self.prod.stack_name),
        ] {
            validate_stage(stage)
                .map_err(|e| ConfigError::Message(format!("[{}] stage: {}", section, e)))?;
            if stack_name.trim().is_empty() {
                return Err(ConfigError::Message(format!(
                    "[{}] stack_name must not be empty",
                    section
                )));
            }
        }

        if self.dev.enabled && self.prod.enabled && self.dev.stack_name == self.prod.stack_name {
            return Err(ConfigError::Message(format!(
                "dev and prod share the stack name '{}'",
                self.dev.stack_name
            )));
        }

        if self.dev.enabled && self.prod.enabled && self.dev.stage == self.prod.stage {
            return Err(ConfigError::Message(format!(
                "dev and prod share the stage '{}'; resource and export names would collide",
                self.dev.stage
            )));
        }

        if self.deploy.poll_interval_secs == 0 {
            return Err(ConfigError::Message(
                "[deploy] poll_interval_secs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn stack_env(&self) -> StackEnv {
        StackEnv::new(self.env.account.clone(), self.env.region.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn load(dir: &TempDir) -> Settings {
        Settings::load(dir.path().to_str().unwrap(), "development").unwrap()
    }

    #[test]
    fn test_substitute_env_vars_in_string_with_default() {
        env::remove_var("CMI_TEST_MISSING_VAR");
        let result = Settings::substitute_env_vars_in_string("${CMI_TEST_MISSING_VAR:-fallback}");
        assert_eq!(result, "fallback");
    }

    #[test]
    fn test_substitute_env_vars_in_string_override_default() {
        env::set_var("CMI_TEST_DOMAIN", "calc.example.org");
        let result = Settings::substitute_env_vars_in_string("${CMI_TEST_DOMAIN:-x} and more");
        assert_eq!(result, "calc.example.org and more");
        env::remove_var("CMI_TEST_DOMAIN");
    }

    #[test]
    fn test_embedded_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let settings = load(&temp_dir);

        assert_eq!(settings.env.account, None);
        assert_eq!(settings.env.region, "ap-northeast-1");
        assert_eq!(settings.dev.stack_name, "CalculatorMergerDevStack");
        assert_eq!(settings.prod.stage, "prod");
        assert_eq!(settings.prod.domain(), Some("calculator-merger.example.com"));
        assert_eq!(settings.output.format, TemplateFormat::Json);
        assert_eq!(settings.deploy.poll_interval_secs, 10);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_run_mode_and_local_files_layer() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("development.yaml"),
            "prod:\n  domain_name: \"\"\noutput:\n  format: yaml\n",
        )
        .unwrap();
        fs::write(
            temp_dir.path().join("local.toml"),
            "[dev]\nstage = \"qa\"\nunknown_key = 1\n",
        )
        .unwrap();

        let settings = load(&temp_dir);
        assert_eq!(settings.prod.domain(), None);
        assert_eq!(settings.output.format, TemplateFormat::Yaml);
        assert_eq!(settings.dev.stage, "qa");
        // Untouched keys keep their defaults
        assert_eq!(settings.dev.stack_name, "CalculatorMergerDevStack");
    }

    #[test]
    fn test_domain_drops_trailing_dot() {
        let temp_dir = TempDir::new().unwrap();
        let mut settings = load(&temp_dir);

        settings.prod.domain_name = Some(" calc.example.com. ".to_string());
        assert_eq!(settings.prod.domain(), Some("calc.example.com"));

        settings.prod.domain_name = Some(".".to_string());
        assert_eq!(settings.prod.domain(), None);
    }

    #[test]
    fn test_cdk_env_overrides() {
        let temp_dir = TempDir::new().unwrap();
        let mut settings = load(&temp_dir);

        settings.apply_cdk_env(Some("123456789012".to_string()), Some(String::new()));
        assert_eq!(settings.env.account.as_deref(), Some("123456789012"));
        assert_eq!(settings.env.region, "ap-northeast-1");

        settings.apply_cdk_env(None, Some("eu-west-1".to_string()));
        assert_eq!(settings.stack_env().region, "eu-west-1");
    }

    #[test]
    fn test_validation_errors() {
        let temp_dir = TempDir::new().unwrap();

        let mut settings = load(&temp_dir);
        settings.dev.stage = "Dev Stage".to_string();
        assert!(settings.validate().is_err());

        let mut settings = load(&temp_dir);
        settings.prod.stack_name = settings.dev.stack_name.clone();
        assert!(settings.validate().is_err());

        let mut settings = load(&temp_dir);
        settings.dev.stage = settings.prod.stage.clone();
        assert!(settings.validate().is_err());
        settings.dev.enabled = false;
        assert!(settings.validate().is_ok());

        let mut settings = load(&temp_dir);
        settings.deploy.poll_interval_secs = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_template_format_from_str() {
        assert_eq!("YAML".parse::<TemplateFormat>(), Ok(TemplateFormat::Yaml));
        assert_eq!("yml".parse::<TemplateFormat>(), Ok(TemplateFormat::Yaml));
        assert!("xml".parse::<TemplateFormat>().is_err());
    }
}
