//! HTTP contract tests for the marketplace adapters, against wiremock.

use async_trait::async_trait;
use marketsync_core::{
    import::PageCursor,
    marketplaces::{EbayAdapter, KauflandAdapter, OttoAdapter, ShopifyAdapter},
    AuthContext, CatalogStore, EndpointConfig, Exporter, ImportControl, ImportSource, Importer,
    ListingApi, ListingRef, Marketplace, MarketplaceError, MemoryCatalog, Price, ProductUpdate,
    Secret, SyncService, TokenManager,
};
use serde_json::json;
use std::sync::Arc;
use wiremock::{
    matchers::{body_partial_json, header, header_exists, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

/// Hands out one fixed token for every marketplace.
struct FixedToken(&'static str);

#[async_trait]
impl TokenManager for FixedToken {
    async fn get_access_token(&self, _marketplace: Marketplace) -> Option<Secret> {
        Some(Secret::new(self.0))
    }
}

fn bearer(token: &str) -> AuthContext {
    AuthContext::new(Secret::new(token))
}

mod otto {
    use super::*;

    #[tokio::test]
    async fn test_import_follows_next_links() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4/products"))
            .and(query_param("limit", "50"))
            .and(header("Authorization", "Bearer otto-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "productVariations": [{
                    "sku": "LAMP-1",
                    "ean": "400123",
                    "productReference": "LAMP",
                    "pricing": { "standardPrice": { "amount": 19.99 } }
                }],
                "links": [{ "rel": "next", "href": "/v4/products?page=2" }]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v4/products"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "productVariations": [{ "sku": "LAMP-2", "productReference": "LAMP-2" }],
                "links": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let catalog = Arc::new(MemoryCatalog::new());
        let importer = Importer::new(
            catalog.clone(),
            Arc::new(FixedToken("otto-token")),
            Arc::new(OttoAdapter::new(EndpointConfig::new(server.uri()))),
        );

        let outcome = importer.run_import(&ImportControl::new()).await;

        assert!(outcome.success);
        assert_eq!(outcome.count, 2);
        let link = catalog
            .find_link_by_external_id(Marketplace::Otto, "LAMP")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(link.price, Price::from_cents(1999));
    }

    #[tokio::test]
    async fn test_update_reports_each_failed_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v5/products/prices"))
            .respond_with(ResponseTemplate::new(500).set_body_string("price service down"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/availability/quantities"))
            .and(body_partial_json(json!([{ "sku": "LAMP-1", "quantity": 0 }])))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = OttoAdapter::new(EndpointConfig::new(server.uri()));
        let updates = ProductUpdate {
            price: Some(Price::from_cents(1250)),
            quantity: Some(0),
            ..ProductUpdate::default()
        };

        let err = adapter
            .update_listing(&bearer("otto-token"), &ListingRef::new("LAMP-1"), &updates)
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("Price: "), "{}", message);
        assert!(!message.contains("Qty: "), "{}", message);
    }
}

mod ebay {
    use super::*;

    #[tokio::test]
    async fn test_search_pages_and_marketplace_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/buy/browse/v1/item_summary/search"))
            .and(query_param("offset", "100"))
            .and(query_param("q", " "))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "itemSummaries": [{ "itemId": "v1|2|0", "price": { "value": "5.00" } }]
            })))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/buy/browse/v1/item_summary/search"))
            .and(header("X-EBAY-C-MARKETPLACE-ID", "EBAY_DE"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "itemSummaries": [{ "itemId": "v1|1|0", "gtin": "400123" }],
                "next": format!("{}/buy/browse/v1/item_summary/search?offset=100", server.uri())
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = EbayAdapter::new(EndpointConfig::new(server.uri()));
        let auth = bearer("ebay-token");

        let first = adapter.fetch_page(&auth, None).await.unwrap();
        assert_eq!(first.items[0].ean.as_deref(), Some("400123"));
        let Some(cursor @ PageCursor::Url(_)) = first.next else {
            panic!("expected a next page");
        };

        let second = adapter.fetch_page(&auth, Some(&cursor)).await.unwrap();
        assert_eq!(second.items[0].price, Price::from_cents(500));
        assert!(second.next.is_none());
    }

    #[tokio::test]
    async fn test_bulk_update_inner_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sell/inventory/v1/bulk_update_price_quantity"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "responses": [{
                    "statusCode": 400,
                    "errors": [{ "message": "Invalid price" }]
                }]
            })))
            .mount(&server)
            .await;

        let adapter = EbayAdapter::new(EndpointConfig::new(server.uri()));
        let err = adapter
            .update_listing(&bearer("t"), &ListingRef::new("SKU-1"), &ProductUpdate::price(Price::from_cents(100)))
            .await
            .unwrap_err();

        assert!(matches!(err, MarketplaceError::Rejected { ref message } if message == "Invalid price"));
    }

    #[tokio::test]
    async fn test_create_returns_offer_id() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/sell/inventory/v1/inventory_item/LAMP-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/sell/inventory/v1/offer"))
            .and(body_partial_json(json!({ "sku": "LAMP-1", "marketplaceId": "EBAY_DE" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "offerId": "5001" })))
            .expect(1)
            .mount(&server)
            .await;

        let catalog = MemoryCatalog::new();
        let product = catalog
            .insert_product(marketsync_core::NewProduct {
                title: "Lamp".to_string(),
                sku: "LAMP-1".to_string(),
                price: Price::from_cents(1999),
                quantity: 2,
                ..Default::default()
            })
            .await
            .unwrap();

        let adapter = EbayAdapter::new(EndpointConfig::new(server.uri()));
        let offer = adapter.create_listing(&bearer("t"), &product).await.unwrap();
        assert_eq!(offer, "5001");
    }

    #[tokio::test]
    async fn test_update_after_publish_addresses_the_sku() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/sell/inventory/v1/inventory_item/LAMP-1"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/sell/inventory/v1/offer"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "offerId": "OFFER-9" })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/sell/inventory/v1/bulk_update_price_quantity"))
            .and(body_partial_json(json!({
                "requests": [{ "sku": "LAMP-1", "shipToLocationAvailability": { "quantity": 2 } }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "responses": [{ "statusCode": 200, "sku": "LAMP-1" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let catalog = Arc::new(MemoryCatalog::new());
        let product = catalog
            .insert_product(marketsync_core::NewProduct {
                title: "Lamp".to_string(),
                sku: "LAMP-1".to_string(),
                price: Price::from_cents(1999),
                quantity: 5,
                ..Default::default()
            })
            .await
            .unwrap();

        let adapter = Arc::new(EbayAdapter::new(EndpointConfig::new(server.uri())));
        let exporter = Exporter::new(catalog.clone(), Arc::new(FixedToken("t")), adapter);
        let published = exporter.publish_product(product.id).await;
        assert_eq!(published.external_id.as_deref(), Some("OFFER-9"));

        let service = SyncService::new(catalog.clone()).with_exporter(exporter);
        let report = service
            .sync_product_update_to_all(product.id, &ProductUpdate::quantity(2))
            .await
            .unwrap();
        assert!(report.all_succeeded(), "{:?}", report);
    }
}

mod kaufland {
    use super::*;

    fn signed() -> AuthContext {
        bearer("client-key").with_signing_secret(Secret::new("secret-key"))
    }

    #[tokio::test]
    async fn test_units_are_signed_and_paged_by_offset() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/units"))
            .and(query_param("offset", "0"))
            .and(query_param("storefront", "de"))
            .and(header("Shop-Client-Key", "client-key"))
            .and(header_exists("Shop-Signature"))
            .and(header_exists("Shop-Timestamp"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "id_unit": 1, "ean": "400123", "price": 1999, "amount": 3 },
                    { "id_unit": 2, "ean": "400124", "price": 500, "amount": 0 }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = KauflandAdapter::new(EndpointConfig::new(server.uri()));
        let page = adapter.fetch_page(&signed(), None).await.unwrap();

        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].price, Price::from_cents(1999));
        // Fewer than 50 units: last page
        assert!(page.next.is_none());
    }

    #[tokio::test]
    async fn test_missing_secret_is_not_configured() {
        let adapter = KauflandAdapter::new(EndpointConfig::new("http://127.0.0.1:1"));
        let err = adapter.fetch_page(&bearer("client-key"), None).await.unwrap_err();
        assert!(matches!(err, MarketplaceError::NotConfigured { .. }));
    }

    #[tokio::test]
    async fn test_update_sends_cents() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/v2/units/987654"))
            .and(body_partial_json(json!({ "listing_price": 1250, "amount": 4 })))
            .and(header_exists("Shop-Signature"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = KauflandAdapter::new(EndpointConfig::new(server.uri()));
        let updates = ProductUpdate {
            price: Some(Price::from_cents(1250)),
            quantity: Some(4),
            ..ProductUpdate::default()
        };
        adapter.update_listing(&signed(), &ListingRef::new("987654"), &updates).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_without_price_or_quantity_is_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let adapter = KauflandAdapter::new(EndpointConfig::new(server.uri()));
        let title_only = ProductUpdate {
            title: Some("Lamp".to_string()),
            ..ProductUpdate::default()
        };
        adapter.update_listing(&signed(), &ListingRef::new("987654"), &title_only).await.unwrap();
    }
}

mod shopify {
    use super::*;

    #[tokio::test]
    async fn test_products_follow_link_header() {
        let server = MockServer::start().await;
        let next = format!(
            "{}/admin/api/2024-01/products.json?limit=250&page_info=abc",
            server.uri()
        );
        Mock::given(method("GET"))
            .and(path("/admin/api/2024-01/products.json"))
            .and(query_param("page_info", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "products": [] })))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/admin/api/2024-01/products.json"))
            .and(header("X-Shopify-Access-Token", "shpat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Link", format!("<{}>; rel=\"next\"", next).as_str())
                    .set_body_json(json!({
                        "products": [{ "id": 11, "title": "Lamp", "variants": [{ "price": "9.90" }] }]
                    })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let adapter = ShopifyAdapter::new(EndpointConfig::new(server.uri()));
        let auth = bearer("shpat");

        let first = adapter.fetch_page(&auth, None).await.unwrap();
        assert_eq!(first.items[0].sku.as_deref(), Some("SHOPIFY-11"));
        assert_eq!(first.next, Some(PageCursor::Url(next)));

        let second = adapter.fetch_page(&auth, first.next.as_ref()).await.unwrap();
        assert!(second.items.is_empty());
        assert!(second.next.is_none());
    }

    #[tokio::test]
    async fn test_update_looks_up_variant() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/admin/api/2024-01/products/11.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "product": { "id": 11, "variants": [{ "id": 999 }] }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/admin/api/2024-01/products/11.json"))
            .and(body_partial_json(json!({
                "product": {
                    "id": 11,
                    "tags": "bulky",
                    "variants": [{ "id": 999, "price": "12.50", "inventory_quantity": 0 }]
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "product": { "id": 11 } })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = ShopifyAdapter::new(EndpointConfig::new(server.uri()));
        let updates = ProductUpdate {
            price: Some(Price::from_cents(1250)),
            quantity: Some(0),
            shipping_type: Some("bulky".to_string()),
            ..ProductUpdate::default()
        };
        adapter.update_listing(&bearer("shpat"), &ListingRef::new("11"), &updates).await.unwrap();
    }
}
