//! Marketplace credential material and where it comes from.
//!
//! This module provides:
//! - [`Secret`] - A wrapper for sensitive values that prevents accidental logging
//! - [`Credential`] - Per-marketplace auth material (OAuth, HMAC keys, API keys)
//! - [`CredentialProvider`] - Trait for credential sources
//! - [`CatalogCredentials`] - Provider backed by the catalog store (writable)
//! - [`EnvCredentials`] - Provider backed by process configuration (read-only)
//! - [`CredentialChain`] - Ordered list of providers, first hit wins
//!
//! The usual chain is catalog first, environment second. A refreshed token
//! is only written back to the provider that supplied the credential, so
//! credentials taken from the environment are never persisted.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::catalog::CatalogError;
use crate::model::Marketplace;

mod catalog;
mod env;

pub use catalog::CatalogCredentials;
pub use env::EnvCredentials;

/// A secret value that prevents accidental exposure in logs.
///
/// The inner value is only accessible via [`expose()`](Secret::expose).
/// Debug and Display implementations show `[REDACTED]` instead of the value.
/// The buffer is zeroed when the secret is dropped.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Create a new secret from a string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Consume the secret and return the inner value.
    pub fn into_inner(mut self) -> String {
        std::mem::take(&mut self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Secret {}

/// Auth material for one marketplace.
///
/// Which fields matter depends on the marketplace's
/// [`AuthScheme`](crate::model::AuthScheme): OAuth marketplaces use the
/// client id/secret and the cached access token, Kaufland uses the client
/// and secret keys, Shopify uses an access token or API key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<Secret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<Secret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<Secret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<Secret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key: Option<Secret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<Secret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<Secret>,
}

impl Credential {
    /// OAuth client credentials.
    pub fn client_credentials(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: Some(Secret::new(client_id)),
            client_secret: Some(Secret::new(client_secret)),
            ..Self::default()
        }
    }

    /// HMAC signing key pair.
    pub fn signing_keys(client_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            client_key: Some(Secret::new(client_key)),
            secret_key: Some(Secret::new(secret_key)),
            ..Self::default()
        }
    }

    /// A bare access token, optionally expiring.
    pub fn access_token(token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            access_token: Some(Secret::new(token)),
            expires_at,
            ..Self::default()
        }
    }

    /// Whether the cached access token stays valid for at least `buffer`.
    ///
    /// A token without an expiry is never considered fresh here.
    pub fn token_valid_for(&self, buffer: Duration) -> bool {
        match (&self.access_token, self.expires_at) {
            (Some(token), Some(expires_at)) => !token.is_empty() && Utc::now() + buffer < expires_at,
            _ => false,
        }
    }

    /// Whether this credential carries anything usable for `marketplace`.
    pub fn is_usable_for(&self, marketplace: Marketplace) -> bool {
        let present = |s: &Option<Secret>| s.as_ref().map(|s| !s.is_empty()).unwrap_or(false);
        match marketplace {
            Marketplace::Otto | Marketplace::Ebay => {
                present(&self.client_id) || present(&self.access_token)
            }
            Marketplace::Kaufland => present(&self.client_key),
            Marketplace::Shopify => present(&self.access_token) || present(&self.api_key),
        }
    }
}

/// A credential record as held by the catalog store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCredential {
    pub id: Uuid,
    pub marketplace: Marketplace,
    pub credentials: Credential,
    pub updated_at: DateTime<Utc>,
}

impl StoredCredential {
    pub fn new(marketplace: Marketplace, credentials: Credential) -> Self {
        Self {
            id: Uuid::new_v4(),
            marketplace,
            credentials,
            updated_at: Utc::now(),
        }
    }
}

/// Where a credential was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialSource {
    /// The catalog store's credential table.
    Store,

    /// Process-level configuration (environment variables).
    Environment,
}

impl CredentialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Store => "store",
            Self::Environment => "environment",
        }
    }
}

impl std::fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error type for credential lookups.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// A provider failed for a reason other than "not found".
    #[error("{source_name} credential provider failed: {message}")]
    Provider {
        source_name: &'static str,
        message: String,
    },

    /// The catalog store failed.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

/// A source of marketplace credentials.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Which kind of source this is.
    fn source(&self) -> CredentialSource;

    /// Look up the credential for a marketplace.
    ///
    /// Returns `Ok(None)` when this source has nothing usable.
    async fn lookup(&self, marketplace: Marketplace) -> Result<Option<Credential>, CredentialError>;

    /// Write refreshed material back. Read-only sources ignore this.
    async fn save(
        &self,
        marketplace: Marketplace,
        _credential: &Credential,
    ) -> Result<(), CredentialError> {
        trace!("{} source is read-only, not saving {}", self.source(), marketplace);
        Ok(())
    }
}

/// A credential together with the provider it came from.
#[derive(Debug, Clone)]
pub struct ResolvedCredential {
    pub credential: Credential,
    pub source: CredentialSource,
    provider_index: usize,
}

/// Ordered list of credential providers.
///
/// Tries each in order until one returns a credential. A failing provider
/// is logged and skipped so a broken store still lets the environment
/// fallback work.
#[derive(Clone, Default)]
pub struct CredentialChain {
    providers: Vec<Arc<dyn CredentialProvider>>,
}

impl CredentialChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider to the end of the chain.
    pub fn with_provider(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Find the first provider holding a credential for `marketplace`.
    pub async fn resolve(&self, marketplace: Marketplace) -> Option<ResolvedCredential> {
        for (provider_index, provider) in self.providers.iter().enumerate() {
            match provider.lookup(marketplace).await {
                Ok(Some(credential)) => {
                    trace!("{} credential found in {}", marketplace, provider.source());
                    return Some(ResolvedCredential {
                        credential,
                        source: provider.source(),
                        provider_index,
                    });
                }
                Ok(None) => continue,
                Err(e) => {
                    trace!("{} provider failed for {}: {}", provider.source(), marketplace, e);
                    continue;
                }
            }
        }
        None
    }

    /// Save refreshed material through the provider that supplied `resolved`.
    pub async fn save(
        &self,
        resolved: &ResolvedCredential,
        marketplace: Marketplace,
        credential: &Credential,
    ) -> Result<(), CredentialError> {
        match self.providers.get(resolved.provider_index) {
            Some(provider) => provider.save(marketplace, credential).await,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for CredentialChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sources: Vec<_> = self.providers.iter().map(|p| p.source()).collect();
        f.debug_struct("CredentialChain").field("providers", &sources).finish()
    }
}
