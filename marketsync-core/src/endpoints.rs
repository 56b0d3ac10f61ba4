//! Marketplace endpoint configuration and registry.
//!
//! This module provides:
//! - [`EndpointConfig`] - API base, token endpoint and scopes for one marketplace
//! - [`EndpointRegistry`] - Per-marketplace endpoint configuration
//!
//! The registry comes pre-configured with the production endpoints and can
//! be overridden per marketplace, e.g. to point tests at a mock server.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::model::Marketplace;

/// Endpoints for one marketplace.
///
/// # Example
///
/// ```
/// use marketsync_core::endpoints::EndpointConfig;
///
/// let otto = EndpointConfig::new("https://api.otto.market")
///     .with_token_url("https://api.otto.market/v1/token")
///     .with_scopes(vec!["products".to_string(), "availability".to_string()]);
/// assert_eq!(otto.url("/v4/products"), "https://api.otto.market/v4/products");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointConfig {
    /// Base URL all API paths are appended to.
    pub api_base: String,

    /// OAuth token endpoint, for client-credentials marketplaces.
    #[serde(default)]
    pub token_url: Option<String>,

    /// Scopes requested in the client-credentials grant.
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl EndpointConfig {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            token_url: None,
            scopes: Vec::new(),
        }
    }

    /// Set the token URL.
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = Some(url.into());
        self
    }

    /// Set the scopes.
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Join an absolute API path onto the base.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Whether the base URL has been filled in.
    pub fn is_configured(&self) -> bool {
        !self.api_base.trim().is_empty()
    }
}

/// Partial override of an [`EndpointConfig`], as read from configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EndpointOverride {
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
}

/// Registry of marketplace endpoints.
///
/// # Example
///
/// ```
/// use marketsync_core::endpoints::EndpointRegistry;
/// use marketsync_core::Marketplace;
///
/// let registry = EndpointRegistry::with_defaults();
/// let ebay = registry.get(Marketplace::Ebay).unwrap();
/// assert_eq!(ebay.api_base, "https://api.ebay.com");
/// ```
#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    endpoints: HashMap<Marketplace, EndpointConfig>,
}

impl EndpointRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the production endpoints.
    ///
    /// Shopify has no fixed host; its base stays empty until a shop domain
    /// is set with [`with_shopify_domain`](Self::with_shopify_domain).
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register(
            Marketplace::Otto,
            EndpointConfig::new("https://api.otto.market")
                .with_token_url("https://api.otto.market/v1/token")
                .with_scopes(vec!["products".to_string(), "availability".to_string()]),
        );

        registry.register(
            Marketplace::Ebay,
            EndpointConfig::new("https://api.ebay.com")
                .with_token_url("https://api.ebay.com/identity/v1/oauth2/token")
                .with_scopes(vec!["https://api.ebay.com/oauth/api_scope".to_string()]),
        );

        registry.register(
            Marketplace::Kaufland,
            EndpointConfig::new("https://sellerapi.kaufland.com"),
        );

        registry.register(Marketplace::Shopify, EndpointConfig::new(""));

        registry
    }

    /// Register or replace the endpoints for a marketplace.
    pub fn register(&mut self, marketplace: Marketplace, config: EndpointConfig) {
        self.endpoints.insert(marketplace, config);
    }

    /// Point Shopify at `https://{domain}`.
    pub fn with_shopify_domain(mut self, domain: &str) -> Self {
        let domain = domain
            .trim()
            .trim_start_matches("https://")
            .trim_end_matches('/');
        if !domain.is_empty() {
            let existing = self.endpoints.remove(&Marketplace::Shopify);
            let mut config = existing.unwrap_or_else(|| EndpointConfig::new(""));
            config.api_base = format!("https://{}", domain);
            self.register(Marketplace::Shopify, config);
        }
        self
    }

    /// Apply a partial override on top of the current configuration.
    pub fn apply_override(&mut self, marketplace: Marketplace, patch: &EndpointOverride) {
        let config = self
            .endpoints
            .entry(marketplace)
            .or_insert_with(|| EndpointConfig::new(""));
        if let Some(api_base) = &patch.api_base {
            config.api_base = api_base.clone();
        }
        if let Some(token_url) = &patch.token_url {
            config.token_url = Some(token_url.clone());
        }
        if let Some(scopes) = &patch.scopes {
            config.scopes = scopes.clone();
        }
    }

    /// Get the endpoints for a marketplace.
    pub fn get(&self, marketplace: Marketplace) -> Option<&EndpointConfig> {
        self.endpoints.get(&marketplace)
    }
}
