//! Otto Market adapter.
//!
//! Bearer-token auth. Listings page through `links[rel=next]`, prices and
//! stock are written through separate endpoints keyed by SKU.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::{absolute_url, as_quantity, check_status, first_str, http_client, json_body, MarketplaceError};
use crate::endpoints::EndpointConfig;
use crate::export::{ListingApi, ListingRef};
use crate::import::{ImportSource, ImportedProduct, Page, PageCursor};
use crate::model::{Marketplace, Product, ProductUpdate};
use crate::price::Price;
use crate::token::AuthContext;

const PAGE_SIZE: usize = 50;

pub struct OttoAdapter {
    endpoint: EndpointConfig,
    http: reqwest::Client,
    page_delay: Duration,
}

impl OttoAdapter {
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

    async fn post_json(&self, auth: &AuthContext, path: &str, body: &Value) -> Result<(), MarketplaceError> {
        let response = self
            .http
            .post(self.endpoint.url(path))
            .bearer_auth(auth.token.expose())
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

fn map_product(raw: &Value) -> Option<ImportedProduct> {
    let external_id = first_str([raw.get("productReference"), raw.get("sku")])?;

    let price = [
        raw.pointer("/pricing/standardPrice/amount"),
        raw.get("price"),
    ]
    .into_iter()
    .flatten()
    .find_map(Price::from_json_major)
    .unwrap_or_default();

    let quantity = match raw.pointer("/stock/quantity") {
        Some(q) => as_quantity(Some(q)),
        None => as_quantity(raw.get("quantity")),
    };

    let images = raw
        .get("mediaAssets")
        .and_then(Value::as_array)
        .map(|assets| {
            assets
                .iter()
                .filter_map(|a| a.get("location").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Some(ImportedProduct {
        external_id,
        title: first_str([raw.get("productName"), raw.get("productReference")]),
        description: first_str([
            raw.pointer("/productDescription/description"),
            raw.get("description"),
        ]),
        sku: first_str([raw.get("sku"), raw.get("partnerSku")]),
        ean: first_str([raw.get("ean"), raw.get("gtin")]),
        price,
        quantity,
        weight: None,
        images,
    })
}

/// The listing array: the body itself, `productVariations` or `resources`.
fn listing_items(body: &Value) -> &[Value] {
    if let Some(items) = body.as_array() {
        return items;
    }
    ["productVariations", "resources"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn next_link(body: &Value) -> Option<&str> {
    body.get("links")?
        .as_array()?
        .iter()
        .find(|l| l.get("rel").and_then(Value::as_str) == Some("next"))?
        .get("href")?
        .as_str()
}

#[async_trait]
impl ImportSource for OttoAdapter {
    fn marketplace(&self) -> Marketplace {
        Marketplace::Otto
    }

    async fn fetch_page(
        &self,
        auth: &AuthContext,
        cursor: Option<&PageCursor>,
    ) -> Result<Page, MarketplaceError> {
        let url = match cursor {
            Some(PageCursor::Url(url)) => url.clone(),
            _ => self.endpoint.url(&format!("/v4/products?limit={}", PAGE_SIZE)),
        };

        let response = self
            .http
            .get(&url)
            .bearer_auth(auth.token.expose())
            .header("Accept", "application/json")
            .send()
            .await?;
        let body = json_body(response).await?;

        let items = listing_items(&body)
            .iter()
            .filter_map(|raw| {
                let mapped = map_product(raw);
                if mapped.is_none() {
                    warn!("Skipping Otto product without reference or SKU");
                }
                mapped
            })
            .collect();

        let next = next_link(&body)
            .and_then(|href| absolute_url(&self.endpoint, href))
            .map(PageCursor::Url);

        Ok(Page { items, next })
    }

    fn page_delay(&self) -> Duration {
        self.page_delay
    }
}

#[async_trait]
impl ListingApi for OttoAdapter {
    fn marketplace(&self) -> Marketplace {
        Marketplace::Otto
    }

    async fn create_listing(
        &self,
        auth: &AuthContext,
        product: &Product,
    ) -> Result<String, MarketplaceError> {
        let sku = product.sku.trim();
        if sku.is_empty() {
            return Err(MarketplaceError::rejected("Otto listings need a SKU"));
        }

        let media: Vec<Value> = product
            .images
            .iter()
            .map(|url| json!({ "type": "IMAGE", "location": url }))
            .collect();
        let body = json!([{
            "sku": sku,
            "ean": product.ean,
            "productReference": sku,
            "productDescription": {
                "description": product.description,
            },
            "productName": product.title,
            "mediaAssets": media,
            "pricing": {
                "standardPrice": { "amount": product.price.to_json_major(), "currency": "EUR" }
            },
        }]);

        self.post_json(auth, "/v5/products", &body).await?;
        debug!("Created Otto product {}", sku);
        // Otto addresses a product by its SKU
        Ok(sku.to_string())
    }

    async fn update_listing(
        &self,
        auth: &AuthContext,
        listing: &ListingRef<'_>,
        updates: &ProductUpdate,
    ) -> Result<(), MarketplaceError> {
        let sku = listing.sku_for(updates);
        let mut errors = Vec::new();

        if let Some(price) = updates.price {
            let body = json!([{
                "sku": sku,
                "standardPrice": { "amount": price.to_json_major(), "currency": "EUR" }
            }]);
            if let Err(e) = self.post_json(auth, "/v5/products/prices", &body).await {
                warn!("Otto price update for {} failed: {}", sku, e);
                errors.push(format!("Price: {}", e));
            }
        }

        if let Some(quantity) = updates.quantity {
            let body = json!([{ "sku": sku, "quantity": quantity }]);
            if let Err(e) = self.post_json(auth, "/v1/availability/quantities", &body).await {
                warn!("Otto quantity update for {} failed: {}", sku, e);
                errors.push(format!("Qty: {}", e));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(MarketplaceError::rejected(errors.join(" | ")))
        }
    }
}
