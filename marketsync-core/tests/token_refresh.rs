//! Integration tests for client-credentials token handling.
//!
//! These tests verify that the DefaultTokenManager correctly:
//! - Exchanges client credentials at the token endpoint
//! - Writes fresh tokens back to the store that supplied the credentials
//! - Never persists credentials taken from the environment
//! - Re-exchanges tokens inside the expiry buffer
//! - Degrades to "no token" when the exchange fails

use chrono::{Duration, Utc};
use marketsync_core::{
    CatalogCredentials, CatalogStore, Credential, CredentialChain, DefaultTokenManager,
    EndpointConfig, EndpointRegistry, EnvCredentials, Marketplace, MemoryCatalog, Secret,
    TokenError, TokenManager, MOCK_TOKEN,
};
use std::collections::HashMap;
use std::sync::Arc;
use wiremock::{
    matchers::{body_string_contains, method, path},
    Mock, MockServer, ResponseTemplate,
};

/// Point Otto at the mock token endpoint.
fn endpoints(server: &MockServer) -> EndpointRegistry {
    let mut registry = EndpointRegistry::with_defaults();
    registry.register(
        Marketplace::Otto,
        EndpointConfig::new(server.uri())
            .with_token_url(format!("{}/v1/token", server.uri()))
            .with_scopes(vec!["products".to_string(), "availability".to_string()]),
    );
    registry
}

async fn mount_token(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/v1/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "fresh-access-token",
            "token_type": "bearer",
            "expires_in": 1800
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn env(pairs: &[(&str, &str)]) -> Arc<EnvCredentials> {
    Arc::new(EnvCredentials::with_vars(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>(),
    ))
}

#[tokio::test]
async fn test_exchange_persists_to_store() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;

    let catalog = Arc::new(MemoryCatalog::new());
    catalog
        .save_credential(Marketplace::Otto, &Credential::client_credentials("otto-id", "otto-secret"))
        .await
        .unwrap();
    let chain = CredentialChain::new().with_provider(Arc::new(CatalogCredentials::new(catalog.clone())));
    let manager = DefaultTokenManager::new(chain, endpoints(&server));

    let token = manager.get_access_token(Marketplace::Otto).await.unwrap();
    assert_eq!(token.expose(), "fresh-access-token");

    let stored = catalog.get_credential(Marketplace::Otto).await.unwrap().unwrap();
    assert_eq!(
        stored.credentials.access_token.as_ref().map(Secret::expose),
        Some("fresh-access-token")
    );
    let expires_at = stored.credentials.expires_at.unwrap();
    assert!(expires_at > Utc::now() + Duration::minutes(25));

    // Second call is served from the stored token
    let again = manager.get_access_token(Marketplace::Otto).await.unwrap();
    assert_eq!(again.expose(), "fresh-access-token");
}

#[tokio::test]
async fn test_environment_credentials_are_not_persisted() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;

    let catalog = Arc::new(MemoryCatalog::new());
    let chain = CredentialChain::new()
        .with_provider(Arc::new(CatalogCredentials::new(catalog.clone())))
        .with_provider(env(&[("OTTO_CLIENT_ID", "env-id"), ("OTTO_CLIENT_SECRET", "env-secret")]));
    let manager = DefaultTokenManager::new(chain, endpoints(&server));

    let token = manager.get_access_token(Marketplace::Otto).await.unwrap();
    assert_eq!(token.expose(), "fresh-access-token");
    assert!(catalog.get_credential(Marketplace::Otto).await.unwrap().is_none());
}

#[tokio::test]
async fn test_token_inside_buffer_is_exchanged() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;

    let catalog = Arc::new(MemoryCatalog::new());
    let mut credential = Credential::client_credentials("otto-id", "otto-secret");
    credential.access_token = Some(Secret::new("about-to-expire"));
    credential.expires_at = Some(Utc::now() + Duration::minutes(3));
    catalog.save_credential(Marketplace::Otto, &credential).await.unwrap();

    let chain = CredentialChain::new().with_provider(Arc::new(CatalogCredentials::new(catalog)));
    let manager = DefaultTokenManager::new(chain, endpoints(&server));

    let token = manager.get_access_token(Marketplace::Otto).await.unwrap();
    assert_eq!(token.expose(), "fresh-access-token");
}

#[tokio::test]
async fn test_exchange_failure_degrades_to_mock() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": "invalid_client",
            "error_description": "Client authentication failed"
        })))
        .mount(&server)
        .await;

    let chain = CredentialChain::new()
        .with_provider(env(&[("OTTO_CLIENT_ID", "bad-id"), ("OTTO_CLIENT_SECRET", "bad-secret")]));
    let manager = DefaultTokenManager::new(chain, endpoints(&server));

    let result = manager.resolve_token(Marketplace::Otto).await;
    assert!(matches!(result, Err(TokenError::ExchangeFailed { .. })));

    assert!(manager.get_access_token(Marketplace::Otto).await.is_none());
    let context = manager.auth_context(Marketplace::Otto).await;
    assert!(!context.authenticated);
    assert_eq!(context.token.expose(), MOCK_TOKEN);
}

#[tokio::test]
async fn test_kaufland_needs_no_exchange() {
    let server = MockServer::start().await;
    // Any request reaching the server fails the expectation on drop
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let chain = CredentialChain::new().with_provider(env(&[
        ("KAUFLAND_CLIENT_KEY", "client-key"),
        ("KAUFLAND_SECRET_KEY", "secret-key"),
    ]));
    let manager = DefaultTokenManager::new(chain, endpoints(&server));

    let context = manager.auth_context(Marketplace::Kaufland).await;
    assert_eq!(context.token.expose(), "client-key");
    assert_eq!(context.signing_secret.as_ref().map(Secret::expose), Some("secret-key"));
}
