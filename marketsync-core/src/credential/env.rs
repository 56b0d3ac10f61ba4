//! Credentials from process configuration.

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

use super::{Credential, CredentialError, CredentialProvider, CredentialSource, Secret};
use crate::model::Marketplace;

/// Read-only provider over environment variables.
///
/// | Marketplace | Variables |
/// |---|---|
/// | otto | `OTTO_CLIENT_ID`, `OTTO_CLIENT_SECRET` |
/// | ebay | `EBAY_OAUTH_TOKEN`, else `EBAY_CLIENT_ID`, `EBAY_CLIENT_SECRET` |
/// | kaufland | `KAUFLAND_CLIENT_KEY`, `KAUFLAND_SECRET_KEY` |
/// | shopify | `SHOPIFY_ACCESS_TOKEN`, `SHOPIFY_API_KEY` |
///
/// Variables are captured when the provider is built.
#[derive(Clone, Default)]
pub struct EnvCredentials {
    vars: HashMap<String, String>,
}

/// Every variable this provider reads.
const KNOWN_VARS: &[&str] = &[
    "OTTO_CLIENT_ID",
    "OTTO_CLIENT_SECRET",
    "EBAY_OAUTH_TOKEN",
    "EBAY_CLIENT_ID",
    "EBAY_CLIENT_SECRET",
    "KAUFLAND_CLIENT_KEY",
    "KAUFLAND_SECRET_KEY",
    "SHOPIFY_ACCESS_TOKEN",
    "SHOPIFY_API_KEY",
];

impl EnvCredentials {
    /// Capture the known variables from the process environment.
    pub fn from_env() -> Self {
        let vars = KNOWN_VARS
            .iter()
            .filter_map(|name| std::env::var(name).ok().map(|v| (name.to_string(), v)))
            .collect();
        Self { vars }
    }

    /// Use an explicit variable map instead of the process environment.
    pub fn with_vars(vars: HashMap<String, String>) -> Self {
        Self { vars }
    }

    fn var(&self, name: &str) -> Option<Secret> {
        self.vars
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(Secret::new)
    }

    fn credential_for(&self, marketplace: Marketplace) -> Credential {
        match marketplace {
            Marketplace::Otto => Credential {
                client_id: self.var("OTTO_CLIENT_ID"),
                client_secret: self.var("OTTO_CLIENT_SECRET"),
                ..Credential::default()
            },
            Marketplace::Ebay => match self.var("EBAY_OAUTH_TOKEN") {
                // A user token takes priority and has no known expiry
                Some(token) => Credential {
                    access_token: Some(token),
                    ..Credential::default()
                },
                None => Credential {
                    client_id: self.var("EBAY_CLIENT_ID"),
                    client_secret: self.var("EBAY_CLIENT_SECRET"),
                    ..Credential::default()
                },
            },
            Marketplace::Kaufland => Credential {
                client_key: self.var("KAUFLAND_CLIENT_KEY"),
                secret_key: self.var("KAUFLAND_SECRET_KEY"),
                ..Credential::default()
            },
            Marketplace::Shopify => Credential {
                access_token: self.var("SHOPIFY_ACCESS_TOKEN"),
                api_key: self.var("SHOPIFY_API_KEY"),
                ..Credential::default()
            },
        }
    }
}

impl std::fmt::Debug for EnvCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.vars.keys().collect();
        names.sort();
        f.debug_struct("EnvCredentials").field("vars", &names).finish()
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentials {
    fn source(&self) -> CredentialSource {
        CredentialSource::Environment
    }

    async fn lookup(&self, marketplace: Marketplace) -> Result<Option<Credential>, CredentialError> {
        let credential = self.credential_for(marketplace);
        if credential.is_usable_for(marketplace) {
            debug!("Using environment credentials for {}", marketplace);
            Ok(Some(credential))
        } else {
            Ok(None)
        }
    }
}
