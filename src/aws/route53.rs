use anyhow::Result;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_route53::Client as Route53Client;
use tracing::debug;

use super::format_sdk_error;
use crate::context::{normalize_zone_name, strip_zone_prefix, ZoneLookup};

/// Hosted zone lookup through `ListHostedZonesByName`
pub struct Route53ZoneLookup {
    client: Route53Client,
}

impl Route53ZoneLookup {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: Route53Client::new(sdk_config),
        }
    }
}

#[async_trait]
impl ZoneLookup for Route53ZoneLookup {
    async fn find_zone_id(&self, zone_name: &str) -> Result<Option<String>> {
        let wanted = normalize_zone_name(zone_name);

        // Results start at the requested name; a handful covers a public and a
        // private zone of the same name
        let response = self
            .client
            .list_hosted_zones_by_name()
            .dns_name(&wanted)
            .max_items(5)
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "ListHostedZonesByName failed for '{}': {}",
                    wanted,
                    format_sdk_error(&e)
                )
            })?;

        for zone in response.hosted_zones() {
            if normalize_zone_name(zone.name()) != wanted {
                continue;
            }
            let private = zone.config().map(|c| c.private_zone()).unwrap_or(false);
            if private {
                debug!("Skipping private hosted zone {} ({})", zone.name(), zone.id());
                continue;
            }
            return Ok(Some(strip_zone_prefix(zone.id())));
        }

        Ok(None)
    }
}
