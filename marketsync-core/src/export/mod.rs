//! Marketplace exports.
//!
//! This module provides:
//! - [`ListingApi`] - Trait each marketplace adapter implements to create
//!   and update listings
//! - [`Exporter`] - Shared publish/update flow: link bookkeeping,
//!   promotion to published, audit logging
//! - [`ExportResult`] - Outcome of one publish or update
//!
//! Marketplace quirks (minor-unit prices, split price and stock endpoints,
//! signed requests, variant lookups) stay inside the adapters.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::catalog::{self, CatalogStore};
use crate::marketplaces::MarketplaceError;
use crate::model::{
    LinkStatus, LinkUpdate, LogStatus, Marketplace, MarketplaceLink, NewSyncLog, Product,
    ProductId, ProductStatus, ProductUpdate, SyncAction,
};
use crate::token::{AuthContext, TokenManager};

/// A marketplace that accepts listing writes.
#[async_trait]
pub trait ListingApi: Send + Sync {
    fn marketplace(&self) -> Marketplace;

    /// Create a listing and return its external id.
    async fn create_listing(
        &self,
        auth: &AuthContext,
        product: &Product,
    ) -> Result<String, MarketplaceError>;

    /// Push the present fields of `updates` to an existing listing.
    async fn update_listing(
        &self,
        auth: &AuthContext,
        listing: &ListingRef<'_>,
        updates: &ProductUpdate,
    ) -> Result<(), MarketplaceError>;
}

/// An existing listing as the exporter knows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingRef<'a> {
    /// The marketplace's id for the listing.
    pub external_id: &'a str,

    /// SKU of the linked catalog product, empty when unknown.
    pub sku: &'a str,
}

impl<'a> ListingRef<'a> {
    pub fn new(external_id: &'a str) -> Self {
        Self { external_id, sku: "" }
    }

    pub fn with_sku(mut self, sku: &'a str) -> Self {
        self.sku = sku;
        self
    }

    /// SKU for marketplaces that address listings by SKU.
    ///
    /// An SKU in the update wins, then the product's SKU. The external id
    /// is the last resort.
    pub fn sku_for<'u>(&self, updates: &'u ProductUpdate) -> &'u str
    where
        'a: 'u,
    {
        updates
            .sku
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or_else(|| Some(self.sku.trim()).filter(|s| !s.is_empty()))
            .unwrap_or(self.external_id)
    }
}

/// Outcome of a publish or update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExportResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            external_id: None,
            error: None,
        }
    }

    pub fn published(external_id: impl Into<String>) -> Self {
        Self {
            success: true,
            external_id: Some(external_id.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            external_id: None,
            error: Some(error.into()),
        }
    }
}

/// Publishes and updates products on one marketplace.
///
/// Every call appends exactly one audit record carrying its outcome.
pub struct Exporter {
    catalog: Arc<dyn CatalogStore>,
    tokens: Arc<dyn TokenManager>,
    api: Arc<dyn ListingApi>,
}

impl Exporter {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        tokens: Arc<dyn TokenManager>,
        api: Arc<dyn ListingApi>,
    ) -> Self {
        Self {
            catalog,
            tokens,
            api,
        }
    }

    pub fn marketplace(&self) -> Marketplace {
        self.api.marketplace()
    }

    /// Create a listing for a product and link it.
    ///
    /// On success the product is promoted to `published`.
    pub async fn publish_product(&self, product_id: ProductId) -> ExportResult {
        let marketplace = self.marketplace();
        let result = match self.try_publish(product_id).await {
            Ok(external_id) => {
                info!("Published {} to {} as {}", product_id, marketplace, external_id);
                ExportResult::published(external_id)
            }
            Err(message) => {
                error!("Publish of {} to {} failed: {}", product_id, marketplace, message);
                ExportResult::failed(message)
            }
        };
        self.log(SyncAction::Export, &result).await;
        result
    }

    async fn try_publish(&self, product_id: ProductId) -> Result<String, String> {
        let marketplace = self.marketplace();

        let product = self
            .catalog
            .get_product(product_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("product not found: {}", product_id))?;

        let auth = self.tokens.auth_context(marketplace).await;
        let external_id = self
            .api
            .create_listing(&auth, &product)
            .await
            .map_err(|e| e.to_string())?;
        if external_id.trim().is_empty() {
            return Err(format!("{} returned no listing id", marketplace));
        }

        self.catalog
            .upsert_link(MarketplaceLink::synced(
                product_id,
                marketplace,
                external_id.clone(),
                product.price,
                product.quantity,
            ))
            .await
            .map_err(|e| format!("listing {} created but not linked: {}", external_id, e))?;

        if product.status != ProductStatus::Published {
            let promote = ProductUpdate {
                status: Some(ProductStatus::Published),
                ..ProductUpdate::default()
            };
            if let Err(e) = self.catalog.update_product(product_id, &promote).await {
                warn!("Failed to mark {} as published: {}", product_id, e);
            }
        }

        Ok(external_id)
    }

    /// Push a partial update to the product's existing listing.
    ///
    /// A product without a link on this marketplace is a reported failure.
    pub async fn update_product(&self, product_id: ProductId, updates: &ProductUpdate) -> ExportResult {
        let marketplace = self.marketplace();

        let link = match self.catalog.get_link(product_id, marketplace).await {
            Ok(Some(link)) => link,
            Ok(None) => {
                let result = ExportResult::failed(format!(
                    "product {} is not linked to {}",
                    product_id, marketplace
                ));
                self.log(SyncAction::Update, &result).await;
                return result;
            }
            Err(e) => {
                let result = ExportResult::failed(e.to_string());
                self.log(SyncAction::Update, &result).await;
                return result;
            }
        };

        let sku = match self.catalog.get_product(product_id).await {
            Ok(product) => product.map(|p| p.sku).unwrap_or_default(),
            Err(e) => {
                warn!("Failed to load {} for its SKU: {}", product_id, e);
                String::new()
            }
        };
        let listing = ListingRef::new(&link.external_id).with_sku(&sku);

        let auth = self.tokens.auth_context(marketplace).await;
        let result = match self.api.update_listing(&auth, &listing, updates).await {
            Ok(()) => {
                debug!("Updated {} listing {}", marketplace, link.external_id);
                self.mark_link(
                    product_id,
                    LinkUpdate {
                        price: updates.price,
                        quantity: updates.quantity,
                        sync_status: Some(LinkStatus::Synced),
                        last_synced_at: Some(Utc::now()),
                    },
                )
                .await;
                ExportResult::ok()
            }
            Err(e) => {
                error!("Update of {} on {} failed: {}", product_id, marketplace, e);
                self.mark_link(
                    product_id,
                    LinkUpdate {
                        sync_status: Some(LinkStatus::Failed),
                        ..LinkUpdate::default()
                    },
                )
                .await;
                ExportResult::failed(e.to_string())
            }
        };

        self.log(SyncAction::Update, &result).await;
        result
    }

    /// Record a failure that happened outside the marketplace call.
    pub(crate) async fn record_failure(&self, product_id: ProductId, message: &str) {
        self.mark_link(
            product_id,
            LinkUpdate {
                sync_status: Some(LinkStatus::Failed),
                ..LinkUpdate::default()
            },
        )
        .await;
        self.log(SyncAction::Update, &ExportResult::failed(message)).await;
    }

    async fn mark_link(&self, product_id: ProductId, update: LinkUpdate) {
        let marketplace = self.marketplace();
        if let Err(e) = self.catalog.update_link(product_id, marketplace, &update).await {
            warn!("Failed to update {} link for {}: {}", marketplace, product_id, e);
        }
    }

    async fn log(&self, action: SyncAction, result: &ExportResult) {
        let marketplace = self.marketplace();
        let entry = match &result.error {
            None => NewSyncLog::new(marketplace, action, LogStatus::Success),
            Some(message) => NewSyncLog::failed(marketplace, action, message.clone()),
        };
        catalog::record(self.catalog.as_ref(), entry).await;
    }
}
