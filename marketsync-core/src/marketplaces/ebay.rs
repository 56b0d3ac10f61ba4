//! eBay adapter.
//!
//! Imports use the Browse API search, optionally filtered to one seller.
//! Listings are created through the Inventory API (inventory item, then
//! offer) and updated with `bulk_update_price_quantity`.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::{check_status, first_str, http_client, json_body, MarketplaceError};
use crate::endpoints::EndpointConfig;
use crate::export::{ListingApi, ListingRef};
use crate::import::{ImportSource, ImportedProduct, Page, PageCursor};
use crate::model::{Marketplace, Product, ProductUpdate};
use crate::price::Price;
use crate::token::AuthContext;

const MARKETPLACE_ID: &str = "EBAY_DE";
const PAGE_SIZE: usize = 100;

pub struct EbayAdapter {
    endpoint: EndpointConfig,
    http: reqwest::Client,
    seller_id: Option<String>,
    page_delay: Duration,
}

impl EbayAdapter {
    pub fn new(endpoint: EndpointConfig) -> Self {
        Self {
            endpoint,
            http: http_client(),
            seller_id: None,
            page_delay: Duration::ZERO,
        }
    }

    /// Only import listings of this seller.
    pub fn with_seller(mut self, seller_id: Option<String>) -> Self {
        self.seller_id = seller_id.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    fn first_page_url(&self) -> String {
        // A single space matches everything when filtering by seller
        let filter = match &self.seller_id {
            Some(seller) => format!("&filter=sellers:{{{}}}", seller.trim()),
            None => String::new(),
        };
        self.endpoint.url(&format!(
            "/buy/browse/v1/item_summary/search?q=%20{}&limit={}",
            filter, PAGE_SIZE
        ))
    }

    fn request(&self, builder: reqwest::RequestBuilder, auth: &AuthContext) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(auth.token.expose())
            .header("X-EBAY-C-MARKETPLACE-ID", MARKETPLACE_ID)
            .header("Content-Language", "de-DE")
    }
}

fn map_item(raw: &Value) -> Option<ImportedProduct> {
    let external_id = first_str([raw.get("itemId")])?;

    Some(ImportedProduct {
        title: first_str([raw.get("title")]),
        description: first_str([raw.get("shortDescription")]),
        sku: first_str([raw.get("sku"), raw.get("legacyItemId"), raw.get("itemId")]),
        ean: first_str([raw.get("gtin"), raw.get("ean"), raw.get("upc"), raw.get("isbn")]),
        price: raw
            .pointer("/price/value")
            .and_then(Price::from_json_major)
            .unwrap_or_default(),
        // Browse summaries carry no stock level
        quantity: 1,
        weight: None,
        images: raw
            .pointer("/image/imageUrl")
            .and_then(Value::as_str)
            .map(|url| vec![url.to_string()])
            .unwrap_or_default(),
        external_id,
    })
}

/// eBay sometimes drops the `q` parameter from `next`; put it back.
fn next_page_url(next: &str) -> String {
    if next.contains("q=") {
        next.to_string()
    } else if next.contains('?') {
        format!("{}&q=%20", next)
    } else {
        format!("{}?q=%20", next)
    }
}

#[async_trait]
impl ImportSource for EbayAdapter {
    fn marketplace(&self) -> Marketplace {
        Marketplace::Ebay
    }

    async fn fetch_page(
        &self,
        auth: &AuthContext,
        cursor: Option<&PageCursor>,
    ) -> Result<Page, MarketplaceError> {
        let url = match cursor {
            Some(PageCursor::Url(url)) => url.clone(),
            _ => self.first_page_url(),
        };

        let response = self.request(self.http.get(&url), auth).send().await?;
        let body = json_body(response).await?;

        let items = body
            .get("itemSummaries")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|raw| {
                        let mapped = map_item(raw);
                        if mapped.is_none() {
                            warn!("Skipping eBay item without itemId");
                        }
                        mapped
                    })
                    .collect()
            })
            .unwrap_or_default();

        let next = body
            .get("next")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(|s| PageCursor::Url(next_page_url(s)));

        Ok(Page { items, next })
    }

    fn page_delay(&self) -> Duration {
        self.page_delay
    }
}

#[async_trait]
impl ListingApi for EbayAdapter {
    fn marketplace(&self) -> Marketplace {
        Marketplace::Ebay
    }

    async fn create_listing(
        &self,
        auth: &AuthContext,
        product: &Product,
    ) -> Result<String, MarketplaceError> {
        let sku = product.sku.trim();
        if sku.is_empty() {
            return Err(MarketplaceError::rejected("eBay listings need a SKU"));
        }

        let inventory = json!({
            "availability": {
                "shipToLocationAvailability": { "quantity": product.quantity }
            },
            "condition": "NEW",
            "product": {
                "title": product.title,
                "description": product.description,
                "imageUrls": product.images,
            }
        });
        let path = format!("/sell/inventory/v1/inventory_item/{}", sku);
        let response = self
            .request(self.http.put(self.endpoint.url(&path)), auth)
            .json(&inventory)
            .send()
            .await?;
        check_status(response).await?;

        let offer = json!({
            "sku": sku,
            "marketplaceId": MARKETPLACE_ID,
            "format": "FIXED_PRICE",
            "availableQuantity": product.quantity,
            "listingDescription": product.description,
            "pricingSummary": {
                "price": { "value": product.price.to_string(), "currency": "EUR" }
            }
        });
        let response = self
            .request(self.http.post(self.endpoint.url("/sell/inventory/v1/offer")), auth)
            .json(&offer)
            .send()
            .await?;
        let body = json_body(response).await?;

        let offer_id = first_str([body.get("offerId")])
            .ok_or_else(|| MarketplaceError::decode("offer response has no offerId"))?;
        debug!("Created eBay offer {} for {}", offer_id, sku);
        Ok(offer_id)
    }

    async fn update_listing(
        &self,
        auth: &AuthContext,
        listing: &ListingRef<'_>,
        updates: &ProductUpdate,
    ) -> Result<(), MarketplaceError> {
        if updates.price.is_none() && updates.quantity.is_none() {
            debug!("No price or quantity for eBay listing {}, skipping", listing.external_id);
            return Ok(());
        }

        let sku = listing.sku_for(updates);
        let mut request = Map::new();
        request.insert("sku".to_string(), json!(sku));
        if let Some(price) = updates.price {
            request.insert(
                "offers".to_string(),
                json!([{ "price": { "value": price.to_string(), "currency": "EUR" } }]),
            );
        }
        if let Some(quantity) = updates.quantity {
            request.insert(
                "shipToLocationAvailability".to_string(),
                json!({ "quantity": quantity }),
            );
        }

        let response = self
            .request(
                self.http
                    .post(self.endpoint.url("/sell/inventory/v1/bulk_update_price_quantity")),
                auth,
            )
            .json(&json!({ "requests": [Value::Object(request)] }))
            .send()
            .await?;
        let body = json_body(response).await?;

        // The bulk call answers 200 even when the item inside failed
        if let Some(inner) = body.pointer("/responses/0") {
            let status = inner.get("statusCode").and_then(Value::as_u64).unwrap_or(200);
            if status >= 400 {
                let message = inner
                    .pointer("/errors/0/message")
                    .and_then(Value::as_str)
                    .unwrap_or("Individual update failed");
                return Err(MarketplaceError::rejected(message));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_item() {
        let raw = json!({
            "itemId": "v1|123|0",
            "legacyItemId": "123",
            "title": "Lamp",
            "gtin": "400123",
            "price": { "value": "12.50", "currency": "EUR" },
            "image": { "imageUrl": "https://i/1.jpg" }
        });
        let item = map_item(&raw).unwrap();
        assert_eq!(item.external_id, "v1|123|0");
        assert_eq!(item.sku.as_deref(), Some("123"));
        assert_eq!(item.price, Price::from_cents(1250));
        assert_eq!(item.quantity, 1);
        assert!(map_item(&json!({ "title": "x" })).is_none());
    }

    #[test]
    fn test_next_page_url_restores_query() {
        assert_eq!(next_page_url("https://e/search?offset=100"), "https://e/search?offset=100&q=%20");
        assert_eq!(next_page_url("https://e/search?q=%20&offset=100"), "https://e/search?q=%20&offset=100");
    }

    #[test]
    fn test_seller_filter() {
        let adapter = EbayAdapter::new(EndpointConfig::new("https://api.ebay.com"))
            .with_seller(Some("shop42".to_string()));
        assert_eq!(
            adapter.first_page_url(),
            "https://api.ebay.com/buy/browse/v1/item_summary/search?q=%20&filter=sellers:{shop42}&limit=100"
        );
    }
}
