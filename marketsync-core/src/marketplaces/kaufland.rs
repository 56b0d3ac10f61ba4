//! Kaufland seller API adapter.
//!
//! Every request is signed: `Shop-Signature` is the hex HMAC-SHA256 of
//! method, full URL, body and timestamp under the secret key, sent with
//! the client key and the timestamp. Prices travel in cents.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::{as_quantity, first_str, http_client, json_body, MarketplaceError};
use crate::endpoints::EndpointConfig;
use crate::export::{ListingApi, ListingRef};
use crate::import::{ImportSource, ImportedProduct, Page, PageCursor};
use crate::model::{Marketplace, Product, ProductUpdate};
use crate::price::Price;
use crate::signing::sign_request;
use crate::token::AuthContext;

const PAGE_SIZE: usize = 50;
const STOREFRONT: &str = "de";

pub struct KauflandAdapter {
    endpoint: EndpointConfig,
    http: reqwest::Client,
    page_delay: Duration,
}

impl KauflandAdapter {
    pub fn new(endpoint: EndpointConfig) -> Self {
        Self {
            endpoint,
            http: http_client(),
            page_delay: Duration::ZERO,
        }
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    /// Send a signed request and return its JSON body (`Null` when empty).
    async fn send_signed(
        &self,
        auth: &AuthContext,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Value, MarketplaceError> {
        let secret = auth
            .signing_secret
            .as_ref()
            .ok_or_else(|| MarketplaceError::NotConfigured {
                marketplace: Marketplace::Kaufland,
                message: "secret key missing".to_string(),
            })?;

        let payload = match body {
            Some(body) => serde_json::to_string(body)
                .map_err(|e| MarketplaceError::decode(e.to_string()))?,
            None => String::new(),
        };
        let timestamp = Utc::now().timestamp();
        let signature = sign_request(method.as_str(), url, &payload, timestamp, secret.expose())
            .map_err(|e| MarketplaceError::NotConfigured {
                marketplace: Marketplace::Kaufland,
                message: format!("cannot sign request: {}", e),
            })?;

        let mut request = self
            .http
            .request(method, url)
            .header("Shop-Client-Key", auth.token.expose())
            .header("Shop-Timestamp", timestamp.to_string())
            .header("Shop-Signature", signature)
            .header("Accept", "application/json");
        if body.is_some() {
            request = request
                .header("Content-Type", "application/json")
                .body(payload);
        }

        let response = request.send().await?;
        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        json_body(response).await
    }
}

fn map_unit(raw: &Value) -> Option<ImportedProduct> {
    let external_id = first_str([raw.get("id_unit")])?;

    let ean = first_str([raw.get("ean"), raw.pointer("/product/eans/0")]);
    Some(ImportedProduct {
        external_id,
        title: first_str([raw.pointer("/product/title")]),
        description: first_str([raw.pointer("/product/description")]),
        sku: first_str([raw.get("v_number")]).or_else(|| ean.clone()),
        ean,
        price: [raw.get("price"), raw.get("listing_price")]
            .into_iter()
            .flatten()
            .find_map(Price::from_json_cents)
            .unwrap_or_default(),
        quantity: as_quantity(raw.get("amount")),
        weight: None,
        images: first_str([
            raw.pointer("/product/main_picture"),
            raw.pointer("/product/picture"),
        ])
        .map(|url| vec![url])
        .unwrap_or_default(),
    })
}

#[async_trait]
impl ImportSource for KauflandAdapter {
    fn marketplace(&self) -> Marketplace {
        Marketplace::Kaufland
    }

    async fn fetch_page(
        &self,
        auth: &AuthContext,
        cursor: Option<&PageCursor>,
    ) -> Result<Page, MarketplaceError> {
        let offset = match cursor {
            Some(PageCursor::Offset(offset)) => *offset,
            _ => 0,
        };
        let url = self.endpoint.url(&format!(
            "/v2/units?limit={}&offset={}&storefront={}&embedded=products",
            PAGE_SIZE, offset, STOREFRONT
        ));

        let body = self.send_signed(auth, Method::GET, &url, None).await?;
        let units = body
            .get("data")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        let items = units
            .iter()
            .filter_map(|raw| {
                let mapped = map_unit(raw);
                if mapped.is_none() {
                    warn!("Skipping Kaufland unit without id_unit");
                }
                mapped
            })
            .collect();

        // A short page is the last one
        let next = (units.len() >= PAGE_SIZE).then(|| PageCursor::Offset(offset + PAGE_SIZE));

        Ok(Page { items, next })
    }

    fn page_delay(&self) -> Duration {
        self.page_delay
    }
}

#[async_trait]
impl ListingApi for KauflandAdapter {
    fn marketplace(&self) -> Marketplace {
        Marketplace::Kaufland
    }

    async fn create_listing(
        &self,
        auth: &AuthContext,
        product: &Product,
    ) -> Result<String, MarketplaceError> {
        let ean = product.ean.trim();
        if ean.is_empty() {
            return Err(MarketplaceError::rejected("Kaufland units need an EAN"));
        }

        let body = json!({
            "ean": ean,
            "condition": "NEW",
            "listing_price": product.price.cents(),
            "amount": product.quantity,
            "note": product.title,
            "storefront": STOREFRONT,
        });
        let url = self.endpoint.url(&format!("/v2/units?storefront={}", STOREFRONT));
        let response = self.send_signed(auth, Method::POST, &url, Some(&body)).await?;

        let id = first_str([response.pointer("/data/id_unit"), response.get("id_unit")])
            .ok_or_else(|| MarketplaceError::decode("unit response has no id_unit"))?;
        debug!("Created Kaufland unit {}", id);
        Ok(id)
    }

    async fn update_listing(
        &self,
        auth: &AuthContext,
        listing: &ListingRef<'_>,
        updates: &ProductUpdate,
    ) -> Result<(), MarketplaceError> {
        let external_id = listing.external_id;
        let mut body = Map::new();
        if let Some(price) = updates.price {
            body.insert("listing_price".to_string(), json!(price.cents()));
        }
        if let Some(quantity) = updates.quantity {
            body.insert("amount".to_string(), json!(quantity));
        }
        if body.is_empty() {
            debug!("No price or quantity for Kaufland unit {}, skipping", external_id);
            return Ok(());
        }

        let url = self
            .endpoint
            .url(&format!("/v2/units/{}?storefront={}", external_id, STOREFRONT));
        self.send_signed(auth, Method::PATCH, &url, Some(&Value::Object(body)))
            .await?;
        Ok(())
    }
}
