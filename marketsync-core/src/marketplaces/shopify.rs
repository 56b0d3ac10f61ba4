//! Shopify Admin REST adapter.
//!
//! Authenticates with `X-Shopify-Access-Token`. Product listings paginate
//! through the `Link` response header.

use async_trait::async_trait;
use reqwest::header::LINK;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::{as_quantity, check_status, first_str, http_client, json_body, MarketplaceError};
use crate::endpoints::EndpointConfig;
use crate::export::{ListingApi, ListingRef};
use crate::import::{ImportSource, ImportedProduct, Page, PageCursor};
use crate::model::{Marketplace, Product, ProductUpdate};
use crate::price::Price;
use crate::token::AuthContext;

const API_VERSION: &str = "2024-01";
const PAGE_SIZE: usize = 250;

pub struct ShopifyAdapter {
    endpoint: EndpointConfig,
    http: reqwest::Client,
    page_delay: Duration,
}

impl ShopifyAdapter {
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

    fn admin_url(&self, path: &str) -> String {
        self.endpoint
            .url(&format!("/admin/api/{}/{}", API_VERSION, path.trim_start_matches('/')))
    }

    fn request(&self, builder: reqwest::RequestBuilder, auth: &AuthContext) -> reqwest::RequestBuilder {
        builder
            .header("X-Shopify-Access-Token", auth.token.expose())
            .header("Accept", "application/json")
    }

    /// Id of the first variant, which carries price, stock and SKU.
    async fn first_variant_id(&self, auth: &AuthContext, product_id: &str) -> Result<Value, MarketplaceError> {
        let url = self.admin_url(&format!("products/{}.json", product_id));
        let response = self.request(self.http.get(url), auth).send().await?;
        let body = json_body(response).await?;
        body.pointer("/product/variants/0/id")
            .filter(|id| !id.is_null())
            .cloned()
            .ok_or_else(|| MarketplaceError::decode(format!("product {} has no variants", product_id)))
    }
}

/// Drop HTML tags from `body_html`.
fn strip_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => text.push(c),
            _ => {}
        }
    }
    text.trim().to_string()
}

/// Shopify ids are integers; keep anything else as a string.
fn numeric_id(id: &str) -> Value {
    id.parse::<u64>().map(Value::from).unwrap_or_else(|_| json!(id))
}

/// The `rel="next"` target of a `Link` header.
fn next_from_link_header(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        if !params.contains("rel=\"next\"") {
            return None;
        }
        let url = target.trim().trim_start_matches('<').trim_end_matches('>');
        (!url.is_empty()).then(|| url.to_string())
    })
}

fn map_product(raw: &Value) -> Option<ImportedProduct> {
    let external_id = first_str([raw.get("id")])?;
    let variant = raw.pointer("/variants/0");

    let images = raw
        .get("images")
        .and_then(Value::as_array)
        .map(|images| {
            images
                .iter()
                .filter_map(|i| i.get("src").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Some(ImportedProduct {
        title: first_str([raw.get("title")]),
        description: raw
            .get("body_html")
            .and_then(Value::as_str)
            .map(strip_tags)
            .filter(|s| !s.is_empty()),
        sku: first_str([variant.and_then(|v| v.get("sku"))])
            .or_else(|| Some(format!("SHOPIFY-{}", external_id))),
        ean: first_str([variant.and_then(|v| v.get("barcode"))]),
        price: variant
            .and_then(|v| v.get("price"))
            .and_then(Price::from_json_major)
            .unwrap_or_default(),
        quantity: as_quantity(variant.and_then(|v| v.get("inventory_quantity"))),
        weight: variant.and_then(|v| v.get("weight")).and_then(Value::as_f64),
        images,
        external_id,
    })
}

#[async_trait]
impl ImportSource for ShopifyAdapter {
    fn marketplace(&self) -> Marketplace {
        Marketplace::Shopify
    }

    async fn fetch_page(
        &self,
        auth: &AuthContext,
        cursor: Option<&PageCursor>,
    ) -> Result<Page, MarketplaceError> {
        let url = match cursor {
            Some(PageCursor::Url(url)) => url.clone(),
            _ => self.admin_url(&format!("products.json?limit={}", PAGE_SIZE)),
        };

        let response = self.request(self.http.get(&url), auth).send().await?;
        let response = check_status(response).await?;
        let next = response
            .headers()
            .get(LINK)
            .and_then(|h| h.to_str().ok())
            .and_then(next_from_link_header)
            .map(PageCursor::Url);
        let body: Value = response.json().await?;

        let items = body
            .get("products")
            .and_then(Value::as_array)
            .map(|products| {
                products
                    .iter()
                    .filter_map(|raw| {
                        let mapped = map_product(raw);
                        if mapped.is_none() {
                            warn!("Skipping Shopify product without id");
                        }
                        mapped
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Page { items, next })
    }

    fn page_delay(&self) -> Duration {
        self.page_delay
    }
}

#[async_trait]
impl ListingApi for ShopifyAdapter {
    fn marketplace(&self) -> Marketplace {
        Marketplace::Shopify
    }

    async fn create_listing(
        &self,
        auth: &AuthContext,
        product: &Product,
    ) -> Result<String, MarketplaceError> {
        let mut variant = Map::new();
        variant.insert("price".to_string(), json!(product.price.to_string()));
        variant.insert("sku".to_string(), json!(product.sku));
        variant.insert("barcode".to_string(), json!(product.ean));
        variant.insert("inventory_quantity".to_string(), json!(product.quantity));
        variant.insert("inventory_management".to_string(), json!("shopify"));
        if let Some(weight) = product.weight {
            variant.insert("weight".to_string(), json!(weight));
            variant.insert("weight_unit".to_string(), json!("kg"));
        }

        let images: Vec<Value> = product.images.iter().map(|src| json!({ "src": src })).collect();
        let body = json!({
            "product": {
                "title": product.title,
                "body_html": product.description,
                "status": "active",
                "variants": [Value::Object(variant)],
                "images": images,
                "tags": product.shipping_type.clone().unwrap_or_default(),
            }
        });

        let response = self
            .request(self.http.post(self.admin_url("products.json")), auth)
            .json(&body)
            .send()
            .await?;
        let body = json_body(response).await?;

        let id = first_str([body.pointer("/product/id")])
            .ok_or_else(|| MarketplaceError::decode("product response has no id"))?;
        debug!("Created Shopify product {}", id);
        Ok(id)
    }

    async fn update_listing(
        &self,
        auth: &AuthContext,
        listing: &ListingRef<'_>,
        updates: &ProductUpdate,
    ) -> Result<(), MarketplaceError> {
        let external_id = listing.external_id;
        let mut product = Map::new();
        product.insert("id".to_string(), numeric_id(external_id));
        if let Some(title) = &updates.title {
            product.insert("title".to_string(), json!(title));
        }
        if let Some(description) = &updates.description {
            product.insert("body_html".to_string(), json!(description));
        }
        if let Some(images) = &updates.images {
            // Sending images replaces the whole gallery
            let images: Vec<Value> = images.iter().map(|src| json!({ "src": src })).collect();
            product.insert("images".to_string(), Value::Array(images));
        }
        if let Some(shipping_type) = &updates.shipping_type {
            product.insert("tags".to_string(), json!(shipping_type));
        }

        let touches_variant = updates.price.is_some()
            || updates.quantity.is_some()
            || updates.sku.is_some()
            || updates.weight.is_some();
        if touches_variant {
            let mut variant = Map::new();
            variant.insert("id".to_string(), self.first_variant_id(auth, external_id).await?);
            if let Some(price) = updates.price {
                variant.insert("price".to_string(), json!(price.to_string()));
            }
            if let Some(quantity) = updates.quantity {
                variant.insert("inventory_quantity".to_string(), json!(quantity));
            }
            if let Some(sku) = &updates.sku {
                variant.insert("sku".to_string(), json!(sku));
            }
            if let Some(weight) = updates.weight {
                variant.insert("weight".to_string(), json!(weight));
                variant.insert("weight_unit".to_string(), json!("kg"));
            }
            product.insert("variants".to_string(), json!([Value::Object(variant)]));
        }

        if product.len() == 1 {
            debug!("Nothing to update for Shopify product {}", external_id);
            return Ok(());
        }

        let url = self.admin_url(&format!("products/{}.json", external_id));
        let response = self
            .request(self.http.put(url), auth)
            .json(&json!({ "product": Value::Object(product) }))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}
