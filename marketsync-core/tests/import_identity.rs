//! Integration tests for cross-marketplace identity resolution.
//!
//! The same physical product listed on two marketplaces must end up as a
//! single catalog product with one link per marketplace, whichever
//! marketplace is imported first.

use async_trait::async_trait;
use marketsync_core::{
    import::{ImportedProduct, Page, PageCursor},
    AuthContext, CatalogStore, CredentialChain, DefaultTokenManager, EndpointRegistry,
    ImportControl, ImportSource, Importer, LogQuery, LogStatus, Marketplace,
    MarketplaceError, MemoryCatalog, NewProduct, Price, ProductStatus, ProductUpdate,
};
use std::sync::Arc;

struct StaticSource {
    marketplace: Marketplace,
    items: Vec<ImportedProduct>,
}

#[async_trait]
impl ImportSource for StaticSource {
    fn marketplace(&self) -> Marketplace {
        self.marketplace
    }

    async fn fetch_page(
        &self,
        _auth: &AuthContext,
        _cursor: Option<&PageCursor>,
    ) -> Result<Page, MarketplaceError> {
        Ok(Page {
            items: self.items.clone(),
            next: None,
        })
    }
}

fn listing(external_id: &str, ean: &str, title: Option<&str>, cents: i64) -> ImportedProduct {
    ImportedProduct {
        external_id: external_id.to_string(),
        title: title.map(str::to_string),
        ean: Some(ean.to_string()),
        price: Price::from_cents(cents),
        quantity: 4,
        ..Default::default()
    }
}

fn importer(catalog: &Arc<MemoryCatalog>, source: StaticSource) -> Importer {
    let tokens = Arc::new(DefaultTokenManager::new(
        CredentialChain::new(),
        EndpointRegistry::with_defaults(),
    ));
    Importer::new(catalog.clone(), tokens, Arc::new(source))
}

fn otto() -> StaticSource {
    StaticSource {
        marketplace: Marketplace::Otto,
        items: vec![listing("OTTO-7", "400123", Some("Desk lamp"), 1999)],
    }
}

fn kaufland() -> StaticSource {
    StaticSource {
        marketplace: Marketplace::Kaufland,
        items: vec![listing("987654", " 400123 ", None, 1899)],
    }
}

async fn assert_single_product(catalog: &MemoryCatalog) {
    assert_eq!(catalog.count_products().await.unwrap(), 1);

    let otto = catalog
        .find_link_by_external_id(Marketplace::Otto, "OTTO-7")
        .await
        .unwrap()
        .unwrap();
    let kaufland = catalog
        .find_link_by_external_id(Marketplace::Kaufland, "987654")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(otto.product_id, kaufland.product_id);
    assert_eq!(kaufland.price, Price::from_cents(1899));

    let product = catalog.get_product(otto.product_id).await.unwrap().unwrap();
    assert_eq!(product.ean, "400123");
    assert_eq!(product.title, "Desk lamp");
    assert_eq!(product.status, ProductStatus::Imported);
}

#[tokio::test]
async fn test_same_ean_merges_otto_first() {
    let catalog = Arc::new(MemoryCatalog::new());
    let control = ImportControl::new();

    assert_eq!(importer(&catalog, otto()).run_import(&control).await.count, 1);
    assert_eq!(importer(&catalog, kaufland()).run_import(&control).await.count, 1);

    assert_single_product(&catalog).await;
}

#[tokio::test]
async fn test_same_ean_merges_kaufland_first() {
    let catalog = Arc::new(MemoryCatalog::new());
    let control = ImportControl::new();

    importer(&catalog, kaufland()).run_import(&control).await;
    importer(&catalog, otto()).run_import(&control).await;

    // The placeholder title from the untitled Kaufland unit is back-filled
    assert_single_product(&catalog).await;
}

#[tokio::test]
async fn test_reimport_keeps_curated_content() {
    let catalog = Arc::new(MemoryCatalog::new());
    let control = ImportControl::new();

    importer(&catalog, otto()).run_import(&control).await;
    let link = catalog
        .find_link_by_external_id(Marketplace::Otto, "OTTO-7")
        .await
        .unwrap()
        .unwrap();
    catalog
        .update_product(
            link.product_id,
            &ProductUpdate {
                title: Some("Curated lamp".to_string()),
                status: Some(ProductStatus::Optimized),
                ..ProductUpdate::default()
            },
        )
        .await
        .unwrap();

    importer(&catalog, otto()).run_import(&control).await;

    let product = catalog.get_product(link.product_id).await.unwrap().unwrap();
    assert_eq!(product.title, "Curated lamp");
    assert_eq!(product.status, ProductStatus::Optimized);
    assert_eq!(catalog.count_products().await.unwrap(), 1);
}

#[tokio::test]
async fn test_ean_match_links_even_when_sku_is_taken() {
    let catalog = Arc::new(MemoryCatalog::new());
    let lamp = catalog
        .insert_product(NewProduct {
            title: "Desk lamp".to_string(),
            ean: "400123".to_string(),
            ..NewProduct::default()
        })
        .await
        .unwrap();
    let shade = catalog
        .insert_product(NewProduct {
            title: "Lamp shade".to_string(),
            sku: "L-1".to_string(),
            ..NewProduct::default()
        })
        .await
        .unwrap();

    let mut item = listing("B1", "400123", Some("Desk lamp"), 1250);
    item.sku = Some("L-1".to_string());
    let source = StaticSource {
        marketplace: Marketplace::Ebay,
        items: vec![item],
    };
    let outcome = importer(&catalog, source).run_import(&ImportControl::new()).await;
    assert!(outcome.success);
    assert_eq!(outcome.count, 1);

    let link = catalog.get_link(lamp.id, Marketplace::Ebay).await.unwrap().unwrap();
    assert_eq!(link.external_id, "B1");
    assert_eq!(link.price, Price::from_cents(1250));

    // The SKU stays with the product that owned it
    let lamp = catalog.get_product(lamp.id).await.unwrap().unwrap();
    assert_eq!(lamp.sku, "");
    let shade = catalog.get_product(shade.id).await.unwrap().unwrap();
    assert_eq!(shade.sku, "L-1");
    assert_eq!(catalog.count_products().await.unwrap(), 2);
}

#[tokio::test]
async fn test_each_run_logs_pending_then_synced() {
    let catalog = Arc::new(MemoryCatalog::new());
    importer(&catalog, otto()).run_import(&ImportControl::new()).await;

    let logs = catalog
        .query_logs(&LogQuery {
            marketplace: Some(Marketplace::Otto),
            ..LogQuery::default()
        })
        .await
        .unwrap();
    let statuses: Vec<LogStatus> = logs.iter().map(|l| l.status).collect();
    // Newest first
    assert_eq!(statuses, vec![LogStatus::Synced, LogStatus::Pending]);
}
