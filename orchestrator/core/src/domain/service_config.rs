// Copyright (c) 2026 Easel Labs
// SPDX-License-Identifier: AGPL-3.0
//! # Service Configuration
//!
//! YAML manifest loaded by the binary at startup. API keys support the
//! `env:VAR_NAME` indirection so manifests can be committed without
//! secrets.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::domain::provider::ProviderKind;
use crate::domain::routing::{ModelFamily, ModelRoute, RouteTable};
use crate::domain::pricing::{PriceTable, DEFAULT_COST};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub models: Vec<ModelEntry>,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notifications: Option<NotificationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { bind: "127.0.0.1:8080".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatabaseConfig {
    /// Postgres connection string; `env:VAR` indirection supported.
    /// When empty or unreachable, the service runs in-memory with the
    /// inline dispatcher.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub endpoint: String,
    /// Plain value or `env:VAR_NAME`.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Listing a provider enables it unless explicitly switched off.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Extra alias/route entries layered over the built-in table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub alias: String,
    pub provider: ProviderKind,
    pub canonical_model: String,
    pub family: ModelFamily,
    #[serde(default)]
    pub requires_reference_image: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    #[serde(default = "default_cost")]
    pub default_cost: i64,
    #[serde(default)]
    pub entries: Vec<PriceEntry>,
}

fn default_cost() -> i64 {
    DEFAULT_COST
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self { default_cost: DEFAULT_COST, entries: Vec::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceEntry {
    pub prefix: String,
    pub cost: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Worker claim interval in milliseconds.
    #[serde(default = "default_claim_interval_ms")]
    pub claim_interval_ms: u64,
    /// Jobs not completed within this window are abandoned as a
    /// backstop; the polling bound is expected to resolve first.
    #[serde(default = "default_abandon_after_secs")]
    pub abandon_after_secs: u64,
}

fn default_claim_interval_ms() -> u64 {
    500
}

fn default_abandon_after_secs() -> u64 {
    15 * 60
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            claim_interval_ms: default_claim_interval_ms(),
            abandon_after_secs: default_abandon_after_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub endpoint: String,
}

impl ServiceConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: ServiceConfig = serde_yaml::from_str(&raw)?;
        Ok(config)
    }

    /// A starter manifest for `easel config generate`.
    pub fn starter() -> Self {
        Self {
            http: HttpConfig::default(),
            database: DatabaseConfig { url: Some("env:DATABASE_URL".to_string()) },
            providers: vec![
                ProviderConfig {
                    kind: ProviderKind::Fal,
                    endpoint: "https://queue.fal.run".to_string(),
                    api_key: Some("env:FAL_KEY".to_string()),
                    enabled: true,
                },
                ProviderConfig {
                    kind: ProviderKind::Replicate,
                    endpoint: "https://api.replicate.com".to_string(),
                    api_key: Some("env:REPLICATE_API_TOKEN".to_string()),
                    enabled: true,
                },
            ],
            models: Vec::new(),
            pricing: PricingConfig::default(),
            queue: QueueConfig::default(),
            notifications: None,
        }
    }

    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Built-in routes overlaid with config entries.
    pub fn route_table(&self) -> RouteTable {
        let mut table = RouteTable::builtin();
        for entry in &self.models {
            table.insert(&entry.alias, ModelRoute {
                provider: entry.provider,
                canonical_model: entry.canonical_model.clone(),
                family: entry.family,
                requires_reference_image: entry.requires_reference_image,
            });
        }
        table
    }

    pub fn price_table(&self) -> PriceTable {
        let mut table = PriceTable::builtin();
        table.set_default(self.pricing.default_cost);
        for entry in &self.pricing.entries {
            table.set(&entry.prefix, entry.cost);
        }
        table
    }
}

/// Resolve a secret value, supporting the `env:VAR_NAME` syntax.
pub fn resolve_secret(value: &Option<String>) -> anyhow::Result<String> {
    match value {
        Some(v) if v.starts_with("env:") => {
            let var_name = v.trim_start_matches("env:");
            std::env::var(var_name)
                .map_err(|_| anyhow::anyhow!("environment variable not set: {}", var_name))
        }
        Some(v) => Ok(v.clone()),
        None => Ok(String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_manifest() {
        let yaml = r#"
http:
  bind: "0.0.0.0:9090"
providers:
  - kind: fal
    endpoint: "https://queue.fal.run"
    api_key: "env:FAL_KEY"
    enabled: true
models:
  - alias: "dreamshot"
    provider: replicate
    canonical_model: "acme/dreamshot"
    family: text-to-image
pricing:
  entries:
    - prefix: "dreamshot"
      cost: 4
"#;
        let config: ServiceConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.http.bind, "0.0.0.0:9090");
        assert_eq!(config.providers.len(), 1);

        let routes = config.route_table();
        let route = routes.resolve("dreamshot", false, false);
        assert_eq!(route.canonical_model, "acme/dreamshot");

        assert_eq!(config.price_table().cost_of("dreamshot-v2"), 4);
    }

    #[test]
    fn listed_provider_is_enabled_by_default() {
        let yaml = r#"
providers:
  - kind: replicate
    endpoint: "https://api.replicate.com"
    api_key: "tok"
"#;
        let config: ServiceConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.providers[0].enabled);
    }

    #[test]
    fn env_indirection_resolves() {
        std::env::set_var("EASEL_TEST_KEY", "sekrit");
        let got = resolve_secret(&Some("env:EASEL_TEST_KEY".into())).unwrap();
        assert_eq!(got, "sekrit");
    }

    #[test]
    fn missing_env_var_is_an_error() {
        assert!(resolve_secret(&Some("env:EASEL_TEST_DOES_NOT_EXIST".into())).is_err());
    }
}
