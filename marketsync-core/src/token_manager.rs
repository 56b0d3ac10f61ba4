//! Default implementation of the TokenManager trait.
//!
//! [`DefaultTokenManager`] resolves credentials through a
//! [`CredentialChain`] and turns them into tokens per marketplace:
//!
//! - Client-credentials marketplaces (Otto, eBay) reuse a cached token that
//!   stays valid past the expiry buffer, otherwise exchange the client id
//!   and secret at the token endpoint and write the new token back through
//!   the provider that supplied the credential.
//! - Kaufland's "token" is its client key; requests are HMAC-signed at the
//!   call site with the secret key.
//! - Shopify's token is the configured access token or API key.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() {
//! use std::sync::Arc;
//! use marketsync_core::{
//!     CatalogCredentials, CredentialChain, EndpointRegistry, EnvCredentials,
//!     MemoryCatalog, Marketplace, DefaultTokenManager, TokenManager,
//! };
//!
//! let catalog = Arc::new(MemoryCatalog::new());
//! let chain = CredentialChain::new()
//!     .with_provider(Arc::new(CatalogCredentials::new(catalog)))
//!     .with_provider(Arc::new(EnvCredentials::from_env()));
//! let manager = DefaultTokenManager::new(chain, EndpointRegistry::with_defaults());
//!
//! if let Some(token) = manager.get_access_token(Marketplace::Otto).await {
//!     println!("got a token ({} chars)", token.expose().len());
//! }
//! # }
//! ```

use async_trait::async_trait;
use chrono::{Duration, Utc};
use oauth2::{
    basic::BasicClient, reqwest::async_http_client, AuthUrl, ClientId, ClientSecret, Scope,
    TokenResponse, TokenUrl,
};
use tracing::{debug, info, warn};

use crate::{
    credential::{CredentialChain, ResolvedCredential, Secret},
    endpoints::{EndpointConfig, EndpointRegistry},
    model::{AuthScheme, Marketplace},
    token::{AuthContext, TokenError, TokenManager},
};

/// Default expiry buffer in minutes.
///
/// Tokens expiring within this many minutes are exchanged again.
const DEFAULT_EXPIRY_BUFFER_MINUTES: i64 = 5;

/// Default implementation of TokenManager.
pub struct DefaultTokenManager {
    credentials: CredentialChain,
    endpoints: EndpointRegistry,
    expiry_buffer: Duration,
}

impl DefaultTokenManager {
    /// Create a new token manager with the default 5 minute expiry buffer.
    pub fn new(credentials: CredentialChain, endpoints: EndpointRegistry) -> Self {
        Self::with_expiry_buffer(credentials, endpoints, DEFAULT_EXPIRY_BUFFER_MINUTES)
    }

    /// Create a new token manager with a custom expiry buffer.
    pub fn with_expiry_buffer(
        credentials: CredentialChain,
        endpoints: EndpointRegistry,
        expiry_buffer_minutes: i64,
    ) -> Self {
        Self {
            credentials,
            endpoints,
            expiry_buffer: Duration::minutes(expiry_buffer_minutes),
        }
    }

    /// Resolve a token, surfacing the reason on failure.
    ///
    /// `Ok(None)` means no provider holds credentials for the marketplace.
    pub async fn resolve_token(&self, marketplace: Marketplace) -> Result<Option<Secret>, TokenError> {
        let Some(resolved) = self.credentials.resolve(marketplace).await else {
            debug!("No credentials found for {}", marketplace);
            return Ok(None);
        };

        match marketplace.auth_scheme() {
            AuthScheme::HmacSigned => Ok(resolved.credential.client_key.clone()),
            AuthScheme::ApiKey => Ok(resolved
                .credential
                .access_token
                .clone()
                .or_else(|| resolved.credential.api_key.clone())),
            AuthScheme::ClientCredentials => {
                self.client_credentials_token(marketplace, &resolved).await.map(Some)
            }
        }
    }

    async fn client_credentials_token(
        &self,
        marketplace: Marketplace,
        resolved: &ResolvedCredential,
    ) -> Result<Secret, TokenError> {
        let credential = &resolved.credential;

        if credential.token_valid_for(self.expiry_buffer) {
            if let Some(token) = &credential.access_token {
                debug!("Using cached access token for {}", marketplace);
                return Ok(token.clone());
            }
        }

        // A token without expiry or client credentials is a static user token
        if credential.client_id.is_none() && credential.expires_at.is_none() {
            if let Some(token) = &credential.access_token {
                debug!("Using static {} token from {}", marketplace, resolved.source);
                return Ok(token.clone());
            }
        }

        let client_id = credential
            .client_id
            .as_ref()
            .ok_or(TokenError::CredentialMissing {
                marketplace,
                field: "client_id",
            })?;
        let client_secret = credential
            .client_secret
            .as_ref()
            .ok_or(TokenError::CredentialMissing {
                marketplace,
                field: "client_secret",
            })?;

        let endpoint = self
            .endpoints
            .get(marketplace)
            .ok_or(TokenError::ProviderNotConfigured { marketplace })?;

        info!("Requesting new {} access token", marketplace);
        let client = create_oauth_client(marketplace, endpoint, client_id, client_secret)?;

        let token_response = client
            .exchange_client_credentials()
            .add_scopes(endpoint.scopes.iter().cloned().map(Scope::new))
            .request_async(async_http_client)
            .await
            .map_err(|e| TokenError::ExchangeFailed {
                message: format!("{} token request failed: {}", marketplace, e),
            })?;

        let access_token = Secret::new(token_response.access_token().secret().as_str());

        let mut updated = credential.clone();
        updated.access_token = Some(access_token.clone());
        updated.expires_at = match token_response.expires_in() {
            Some(duration) => Some(
                Utc::now()
                    + Duration::from_std(duration).map_err(|e| TokenError::ExchangeFailed {
                        message: format!("invalid expiration duration: {}", e),
                    })?,
            ),
            None => None,
        };
        if let Some(refresh) = token_response.refresh_token() {
            updated.refresh_token = Some(Secret::new(refresh.secret().as_str()));
        }

        // Only the supplying provider is written, so env credentials never persist
        if let Err(e) = self.credentials.save(resolved, marketplace, &updated).await {
            warn!("Failed to persist refreshed {} token: {}", marketplace, e);
        }

        Ok(access_token)
    }
}

/// Create an OAuth2 client for a client-credentials marketplace.
fn create_oauth_client(
    marketplace: Marketplace,
    endpoint: &EndpointConfig,
    client_id: &Secret,
    client_secret: &Secret,
) -> Result<BasicClient, TokenError> {
    let token_url = endpoint
        .token_url
        .as_ref()
        .ok_or(TokenError::ProviderNotConfigured { marketplace })?;

    let token_url = TokenUrl::new(token_url.clone()).map_err(|e| TokenError::OAuthError {
        message: format!("invalid token URL: {}", e),
    })?;

    // The grant never visits the authorization endpoint; the API base fills the slot
    let auth_url = AuthUrl::new(endpoint.api_base.clone()).map_err(|e| TokenError::OAuthError {
        message: format!("invalid API base URL: {}", e),
    })?;

    Ok(BasicClient::new(
        ClientId::new(client_id.expose().to_string()),
        Some(ClientSecret::new(client_secret.expose().to_string())),
        auth_url,
        Some(token_url),
    ))
}

#[async_trait]
impl TokenManager for DefaultTokenManager {
    async fn get_access_token(&self, marketplace: Marketplace) -> Option<Secret> {
        match self.resolve_token(marketplace).await {
            Ok(token) => token,
            Err(e) => {
                warn!("Token resolution failed for {}: {}", marketplace, e);
                None
            }
        }
    }

    async fn auth_context(&self, marketplace: Marketplace) -> AuthContext {
        let mut context = match self.get_access_token(marketplace).await {
            Some(token) => AuthContext::new(token),
            None => {
                warn!("No token for {}, proceeding with mock token", marketplace);
                AuthContext::mock()
            }
        };

        if marketplace.auth_scheme() == AuthScheme::HmacSigned {
            if let Some(secret) = self
                .credentials
                .resolve(marketplace)
                .await
                .and_then(|r| r.credential.secret_key)
            {
                context = context.with_signing_secret(secret);
            }
        }

        context
    }
}

impl std::fmt::Debug for DefaultTokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultTokenManager")
            .field("credentials", &self.credentials)
            .field("expiry_buffer", &self.expiry_buffer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogStore, MemoryCatalog};
    use crate::credential::{CatalogCredentials, Credential, EnvCredentials};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn env(pairs: &[(&str, &str)]) -> Arc<EnvCredentials> {
        Arc::new(EnvCredentials::with_vars(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        ))
    }

    #[tokio::test]
    async fn test_no_credentials_yields_none() {
        let manager = DefaultTokenManager::new(CredentialChain::new(), EndpointRegistry::with_defaults());
        assert!(manager.get_access_token(Marketplace::Otto).await.is_none());
        assert!(!manager.auth_context(Marketplace::Otto).await.authenticated);
    }

    #[tokio::test]
    async fn test_cached_token_reused() {
        let catalog = Arc::new(MemoryCatalog::new());
        let mut credential = Credential::client_credentials("id", "secret");
        credential.access_token = Some(Secret::new("cached"));
        credential.expires_at = Some(Utc::now() + Duration::hours(1));
        catalog.save_credential(Marketplace::Otto, &credential).await.unwrap();

        let chain = CredentialChain::new().with_provider(Arc::new(CatalogCredentials::new(catalog)));
        // Unroutable token URL: reaching the network would fail the test
        let mut endpoints = EndpointRegistry::with_defaults();
        endpoints.register(
            Marketplace::Otto,
            EndpointConfig::new("http://127.0.0.1:1").with_token_url("http://127.0.0.1:1/token"),
        );
        let manager = DefaultTokenManager::new(chain, endpoints);

        let token = manager.get_access_token(Marketplace::Otto).await.unwrap();
        assert_eq!(token.expose(), "cached");
    }

    #[tokio::test]
    async fn test_static_ebay_user_token() {
        let chain = CredentialChain::new().with_provider(env(&[("EBAY_OAUTH_TOKEN", "v^1.1#user")]));
        let manager = DefaultTokenManager::new(chain, EndpointRegistry::with_defaults());

        let token = manager.get_access_token(Marketplace::Ebay).await.unwrap();
        assert_eq!(token.expose(), "v^1.1#user");
    }

    #[tokio::test]
    async fn test_kaufland_context_carries_signing_secret() {
        let chain = CredentialChain::new().with_provider(env(&[
            ("KAUFLAND_CLIENT_KEY", "client-key"),
            ("KAUFLAND_SECRET_KEY", "secret-key"),
        ]));
        let manager = DefaultTokenManager::new(chain, EndpointRegistry::with_defaults());

        let context = manager.auth_context(Marketplace::Kaufland).await;
        assert!(context.authenticated);
        assert_eq!(context.token.expose(), "client-key");
        assert_eq!(context.signing_secret.unwrap().expose(), "secret-key");
    }

    #[tokio::test]
    async fn test_shopify_api_key_fallback() {
        let chain = CredentialChain::new().with_provider(env(&[("SHOPIFY_API_KEY", "shpat_key")]));
        let manager = DefaultTokenManager::new(chain, EndpointRegistry::with_defaults());

        let token = manager.get_access_token(Marketplace::Shopify).await.unwrap();
        assert_eq!(token.expose(), "shpat_key");
    }

    #[tokio::test]
    async fn test_missing_secret_is_reported() {
        let chain = CredentialChain::new().with_provider(env(&[("OTTO_CLIENT_ID", "id")]));
        let manager = DefaultTokenManager::new(chain, EndpointRegistry::with_defaults());

        let result = manager.resolve_token(Marketplace::Otto).await;
        assert!(matches!(
            result,
            Err(TokenError::CredentialMissing { field: "client_secret", .. })
        ));
        assert!(manager.get_access_token(Marketplace::Otto).await.is_none());
    }
}
