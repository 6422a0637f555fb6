// Lookup context (infra.context.json)
//
// Synthesis never talks to AWS. Values that would need a lookup, such as the
// id of the hosted zone a domain lives in, are read from this file instead and
// refreshed explicitly with `cmi context lookup`.

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::constructs::dns::HostedZone;
use crate::error::SynthError;

pub const DEFAULT_CONTEXT_FILE: &str = "infra.context.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Hosted zone name → zone id (without the `/hostedzone/` prefix)
    #[serde(default)]
    pub hosted_zones: BTreeMap<String, String>,
}

impl Context {
    /// Read the context file; a missing file is an empty context
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No context file at {}, starting empty", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read context file {}", path.display()))?;
        let context: Context = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse context file {}", path.display()))?;
        debug!(
            "Loaded {} hosted zone(s) from {}",
            context.hosted_zones.len(),
            path.display()
        );
        Ok(context)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut content =
            serde_json::to_string_pretty(self).context("Failed to serialize context")?;
        content.push('\n');
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write context file {}", path.display()))?;
        info!("Wrote context file {}", path.display());
        Ok(())
    }

    pub fn hosted_zone(&self, zone_name: &str) -> Result<HostedZone, SynthError> {
        let key = normalize_zone_name(zone_name);
        match self.hosted_zones.get(&key) {
            Some(zone_id) => Ok(HostedZone {
                zone_id: zone_id.clone(),
                zone_name: key,
            }),
            None => Err(SynthError::MissingContext { zone: key }),
        }
    }

    pub fn insert_hosted_zone(&mut self, zone_name: &str, zone_id: &str) {
        self.hosted_zones
            .insert(normalize_zone_name(zone_name), strip_zone_prefix(zone_id));
    }

    /// Look up every zone in `required` that the context does not know yet.
    ///
    /// Returns the names that were added. Zones the lookup cannot find are
    /// reported and skipped so the remaining ones still get resolved.
    pub async fn resolve_missing(
        &mut self,
        required: &[String],
        lookup: &dyn ZoneLookup,
    ) -> Result<Vec<String>> {
        let mut added = Vec::new();
        for zone_name in required {
            let key = normalize_zone_name(zone_name);
            if self.hosted_zones.contains_key(&key) {
                debug!("Hosted zone {} already in context", key);
                continue;
            }

            match lookup.find_zone_id(&key).await? {
                Some(zone_id) => {
                    info!("Resolved hosted zone {} to {}", key, zone_id);
                    self.insert_hosted_zone(&key, &zone_id);
                    added.push(key);
                }
                None => warn!("No hosted zone named {} is visible to this account", key),
            }
        }
        Ok(added)
    }
}

/// Source of hosted zone ids, e.g. Route 53
#[async_trait]
pub trait ZoneLookup: Send + Sync {
    async fn find_zone_id(&self, zone_name: &str) -> Result<Option<String>>;
}

/// Lowercase, without the trailing dot Route 53 puts on zone names
pub fn normalize_zone_name(zone_name: &str) -> String {
    zone_name.trim_end_matches('.').to_ascii_lowercase()
}

/// `/hostedzone/Z123` → `Z123`
pub fn strip_zone_prefix(zone_id: &str) -> String {
    zone_id
        .strip_prefix("/hostedzone/")
        .unwrap_or(zone_id)
        .to_string()
}
