//! Token resolution for marketplace API access.
//!
//! This module provides:
//! - [`TokenError`] - Why a token could not be resolved
//! - [`AuthContext`] - Everything an adapter needs to authenticate one call
//! - [`TokenManager`] - Trait for per-marketplace token resolution

use async_trait::async_trait;
use thiserror::Error;

use crate::credential::{CredentialError, Secret};
use crate::model::Marketplace;

/// Token handed to adapters when no real token could be resolved.
///
/// Calls made with it fail at the marketplace, which is reported like any
/// other API failure instead of aborting the job.
pub const MOCK_TOKEN: &str = "mock_token";

/// Error type for token operations.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Credential material needed for the exchange is missing.
    #[error("{field} missing for {marketplace}")]
    CredentialMissing {
        marketplace: Marketplace,
        field: &'static str,
    },

    /// The token endpoint rejected the exchange or could not be reached.
    #[error("token exchange failed: {message}")]
    ExchangeFailed { message: String },

    /// OAuth client setup failed (bad URLs).
    #[error("OAuth setup failed: {message}")]
    OAuthError { message: String },

    /// No endpoints are configured for the marketplace.
    #[error("marketplace not configured: {marketplace}")]
    ProviderNotConfigured { marketplace: Marketplace },

    /// Storage error reading or writing credentials.
    #[error("storage error: {0}")]
    StorageError(#[from] CredentialError),
}

/// Authentication inputs for one marketplace call.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Bearer token, client key or API key depending on the marketplace.
    pub token: Secret,

    /// HMAC secret for signed marketplaces.
    pub signing_secret: Option<Secret>,

    /// `false` when `token` is the [`MOCK_TOKEN`] placeholder.
    pub authenticated: bool,
}

impl AuthContext {
    pub fn new(token: Secret) -> Self {
        Self {
            token,
            signing_secret: None,
            authenticated: true,
        }
    }

    /// The degraded context used when resolution failed.
    pub fn mock() -> Self {
        Self {
            token: Secret::new(MOCK_TOKEN),
            signing_secret: None,
            authenticated: false,
        }
    }

    pub fn with_signing_secret(mut self, secret: Secret) -> Self {
        self.signing_secret = Some(secret);
        self
    }

    /// Value for an `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token.expose())
    }
}

/// Trait for resolving marketplace tokens.
///
/// Resolution never fails outright: anything that goes wrong is logged and
/// surfaces as `None`, so sync jobs keep running in a degraded mode.
#[async_trait]
pub trait TokenManager: Send + Sync {
    /// Get a usable token for the marketplace, refreshing if necessary.
    async fn get_access_token(&self, marketplace: Marketplace) -> Option<Secret>;

    /// Build the auth inputs for a call, falling back to [`AuthContext::mock`].
    async fn auth_context(&self, marketplace: Marketplace) -> AuthContext {
        match self.get_access_token(marketplace).await {
            Some(token) => AuthContext::new(token),
            None => {
                tracing::warn!("No token for {}, proceeding with mock token", marketplace);
                AuthContext::mock()
            }
        }
    }
}
