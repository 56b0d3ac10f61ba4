//! CLI configuration handling.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use marketsync_core::{AdapterSettings, EndpointOverride, EndpointRegistry, Marketplace};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the configured cron secret.
const CRON_SECRET_VAR: &str = "CRON_SECRET";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Path to the configuration file that was loaded.
    #[serde(skip)]
    pub config_path: PathBuf,

    /// JSON file backing the catalog.
    pub catalog_path: PathBuf,

    /// Logging level when `RUST_LOG` is unset.
    pub log_level: String,

    /// Shared secret guarding the scheduled import-all trigger.
    pub cron_secret: Option<String>,

    /// Pause between listing pages, in milliseconds.
    pub page_delay_ms: u64,

    /// Page ceiling per import run.
    pub max_pages: usize,

    /// Restrict eBay imports to one seller.
    pub ebay_seller_id: Option<String>,

    /// Shop domain, e.g. `demo.myshopify.com`.
    pub shopify_shop_domain: Option<String>,

    /// Per-marketplace endpoint overrides.
    pub endpoints: BTreeMap<Marketplace, EndpointOverride>,
}

impl Default for CliConfig {
    fn default() -> Self {
        let data_dir = project_dirs()
            .map(|d| d.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".marketsync"));

        Self {
            config_path: PathBuf::new(),
            catalog_path: data_dir.join("catalog.json"),
            log_level: "info".to_string(),
            cron_secret: None,
            page_delay_ms: 500,
            max_pages: marketsync_core::import::DEFAULT_MAX_PAGES,
            ebay_seller_id: None,
            shopify_shop_domain: None,
            endpoints: BTreeMap::new(),
        }
    }
}

impl CliConfig {
    /// Endpoint registry with the production defaults, the shop domain and
    /// any configured overrides applied.
    pub fn endpoint_registry(&self) -> EndpointRegistry {
        let mut registry = EndpointRegistry::with_defaults();
        if let Some(domain) = &self.shopify_shop_domain {
            registry = registry.with_shopify_domain(domain);
        }
        for (marketplace, patch) in &self.endpoints {
            registry.apply_override(*marketplace, patch);
        }
        registry
    }

    pub fn adapter_settings(&self) -> AdapterSettings {
        AdapterSettings {
            page_delay: Duration::from_millis(self.page_delay_ms),
            ebay_seller_id: self.ebay_seller_id.clone(),
        }
    }

    /// Let a non-empty environment value replace the configured cron secret.
    fn override_cron_secret(&mut self, value: Option<String>) {
        if let Some(secret) = value.filter(|s| !s.trim().is_empty()) {
            self.cron_secret = Some(secret);
        }
    }
}

/// Load configuration from `path`, or the default location, or defaults.
pub fn load_config(path: Option<&Path>) -> Result<CliConfig> {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => project_dirs()
            .map(|d| d.config_dir().join("marketsync.toml"))
            .unwrap_or_else(|| PathBuf::from("marketsync.toml")),
    };

    let mut config = load_from(&config_path)?;
    config.override_cron_secret(std::env::var(CRON_SECRET_VAR).ok());
    Ok(config)
}

fn load_from(config_path: &Path) -> Result<CliConfig> {
    let mut config = if config_path.exists() {
        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config from {:?}", config_path))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", config_path))?
    } else {
        CliConfig::default()
    };

    config.config_path = config_path.to_path_buf();

    if let Some(data_dir) = config.catalog_path.parent() {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;
    }

    Ok(config)
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "marketsync", "marketsync")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_overrides_and_defaults() {
        let temp = TempDir::new().unwrap();
        let catalog_path = temp.path().join("data").join("catalog.json");
        let config_path = temp.path().join("marketsync.toml");
        std::fs::write(
            &config_path,
            format!(
                r#"
catalog_path = {:?}
cron_secret = "from-file"
shopify_shop_domain = "demo.myshopify.com"

[endpoints.otto]
api_base = "https://sandbox.api.otto.market"
"#,
                catalog_path
            ),
        )
        .unwrap();

        let config = load_from(&config_path).unwrap();

        assert_eq!(config.catalog_path, catalog_path);
        assert!(catalog_path.parent().unwrap().is_dir());
        assert_eq!(config.log_level, "info");
        assert_eq!(config.max_pages, 50);

        let registry = config.endpoint_registry();
        assert_eq!(
            registry.get(Marketplace::Otto).unwrap().api_base,
            "https://sandbox.api.otto.market"
        );
        assert!(registry.get(Marketplace::Otto).unwrap().token_url.is_some());
        assert_eq!(
            registry.get(Marketplace::Shopify).unwrap().api_base,
            "https://demo.myshopify.com"
        );
    }

    #[test]
    fn test_partial_file_and_cron_override() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("marketsync.toml");
        let catalog_path = temp.path().join("catalog.json");
        std::fs::write(&config_path, format!("catalog_path = {:?}\n", catalog_path)).unwrap();

        let mut config = load_from(&config_path).unwrap();
        assert!(config.cron_secret.is_none());
        assert_eq!(config.page_delay_ms, 500);

        config.override_cron_secret(Some("  ".to_string()));
        assert!(config.cron_secret.is_none());

        config.override_cron_secret(Some("from-env".to_string()));
        assert_eq!(config.cron_secret.as_deref(), Some("from-env"));
    }
}
