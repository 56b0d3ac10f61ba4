//! HTTP adapters for the supported marketplaces.
//!
//! Each adapter implements both [`ImportSource`] and [`ListingApi`] over
//! `reqwest`. [`build_clients`] wires the right adapter for a marketplace
//! from the endpoint registry.

use reqwest::Response;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::endpoints::{EndpointConfig, EndpointRegistry};
use crate::export::ListingApi;
use crate::import::ImportSource;
use crate::model::Marketplace;

pub mod ebay;
pub mod kaufland;
pub mod otto;
pub mod shopify;

pub use ebay::EbayAdapter;
pub use kaufland::KauflandAdapter;
pub use otto::OttoAdapter;
pub use shopify::ShopifyAdapter;

/// Longest API error body kept in messages and logs.
const MAX_ERROR_BODY: usize = 500;

/// Error type for marketplace API calls.
#[derive(Debug, Error)]
pub enum MarketplaceError {
    /// The request could not be sent or the response not read.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The marketplace answered with a non-success status.
    #[error("API returned {status}: {body}")]
    Api { status: u16, body: String },

    /// The marketplace accepted the request but refused the change.
    #[error("rejected: {message}")]
    Rejected { message: String },

    /// Required adapter configuration is missing.
    #[error("{marketplace} not configured: {message}")]
    NotConfigured {
        marketplace: Marketplace,
        message: String,
    },

    /// The response did not have the expected shape.
    #[error("unexpected response: {message}")]
    Decode { message: String },
}

impl MarketplaceError {
    pub(crate) fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub(crate) fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }
}

/// Settings shared by the adapters beyond their endpoints.
#[derive(Debug, Clone, Default)]
pub struct AdapterSettings {
    /// Pause between listing pages.
    pub page_delay: Duration,

    /// Restrict eBay imports to one seller.
    pub ebay_seller_id: Option<String>,
}

/// One marketplace's adapter seen through both capabilities.
#[derive(Clone)]
pub struct MarketplaceClients {
    pub source: Arc<dyn ImportSource>,
    pub listings: Arc<dyn ListingApi>,
}

/// Build the adapter for `marketplace`.
pub fn build_clients(
    marketplace: Marketplace,
    endpoints: &EndpointRegistry,
    settings: &AdapterSettings,
) -> Result<MarketplaceClients, MarketplaceError> {
    let endpoint = endpoints
        .get(marketplace)
        .filter(|e| e.is_configured())
        .cloned()
        .ok_or_else(|| MarketplaceError::NotConfigured {
            marketplace,
            message: "no API base URL".to_string(),
        })?;

    Ok(match marketplace {
        Marketplace::Otto => pair(OttoAdapter::new(endpoint).with_page_delay(settings.page_delay)),
        Marketplace::Ebay => pair(
            EbayAdapter::new(endpoint)
                .with_seller(settings.ebay_seller_id.clone())
                .with_page_delay(settings.page_delay),
        ),
        Marketplace::Kaufland => {
            pair(KauflandAdapter::new(endpoint).with_page_delay(settings.page_delay))
        }
        Marketplace::Shopify => {
            pair(ShopifyAdapter::new(endpoint).with_page_delay(settings.page_delay))
        }
    })
}

fn pair<A: ImportSource + ListingApi + 'static>(adapter: A) -> MarketplaceClients {
    let adapter = Arc::new(adapter);
    MarketplaceClients {
        source: adapter.clone(),
        listings: adapter,
    }
}

/// Shared HTTP client construction.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!("marketsync/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Turn a non-success response into [`MarketplaceError::Api`].
pub(crate) async fn check_status(response: Response) -> Result<Response, MarketplaceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    Err(MarketplaceError::Api {
        status: status.as_u16(),
        body,
    })
}

/// Read a JSON body.
pub(crate) async fn json_body(response: Response) -> Result<Value, MarketplaceError> {
    let response = check_status(response).await?;
    Ok(response.json::<Value>().await?)
}

/// First non-empty string among `candidates`, accepting numbers too.
pub(crate) fn first_str<'a>(candidates: impl IntoIterator<Item = Option<&'a Value>>) -> Option<String> {
    candidates.into_iter().flatten().find_map(|v| match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Read a non-negative integer from a number or numeric string.
pub(crate) fn as_quantity(value: Option<&Value>) -> u32 {
    match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .map(|q| q.min(u64::from(u32::MAX)) as u32)
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse::<u32>().unwrap_or(0),
        _ => 0,
    }
}

/// Resolve a possibly relative pagination link against the API base.
pub(crate) fn absolute_url(endpoint: &EndpointConfig, href: &str) -> Option<String> {
    let base = url::Url::parse(&endpoint.api_base).ok()?;
    base.join(href).ok().map(|u| u.to_string())
}
