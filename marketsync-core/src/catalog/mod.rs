//! Catalog storage abstraction.
//!
//! This module provides:
//! - [`CatalogStore`] - Trait over the store holding products, marketplace
//!   links, credentials and the sync log
//! - [`CatalogError`] - Error type for store operations
//! - [`MemoryCatalog`] - In-memory implementation, optionally persisted to
//!   a JSON file after every mutation
//!
//! The engine only needs point lookups by id or natural key, inserts,
//! partial updates, upserts keyed by `(product, marketplace)`, filtered
//! deletes and counts. Anything richer belongs to the hosting application.

use async_trait::async_trait;
use thiserror::Error;

use crate::credential::{Credential, StoredCredential};
use crate::model::{
    LinkFilter, LinkUpdate, LogQuery, Marketplace, MarketplaceLink, NewProduct, NewSyncLog,
    Product, ProductId, ProductUpdate, SyncLogEntry,
};

mod memory;

pub use memory::MemoryCatalog;

/// Error type for catalog store operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The addressed record does not exist.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// A unique constraint (EAN, SKU) would be violated.
    #[error("unique constraint violated on {field}: {value}")]
    Conflict { field: &'static str, value: String },

    /// The storage backend encountered an error.
    #[error("backend error: {message}")]
    Backend { message: String },

    /// I/O error reading or writing a persisted catalog.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CatalogError {
    pub(crate) fn product_not_found(id: ProductId) -> Self {
        Self::NotFound {
            entity: "product",
            key: id.to_string(),
        }
    }

    pub(crate) fn link_not_found(id: ProductId, marketplace: Marketplace) -> Self {
        Self::NotFound {
            entity: "marketplace link",
            key: format!("{}/{}", id, marketplace),
        }
    }
}

/// Abstraction over the catalog store.
///
/// Implementations must keep at most one link per `(product, marketplace)`
/// and should reject a second product with the same non-empty EAN or SKU.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Retrieve a product by id.
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, CatalogError>;

    /// Find the product carrying this exact EAN.
    async fn find_product_by_ean(&self, ean: &str) -> Result<Option<Product>, CatalogError>;

    /// Find the product carrying this exact SKU.
    async fn find_product_by_sku(&self, sku: &str) -> Result<Option<Product>, CatalogError>;

    /// Retrieve the products among `ids` that exist. Missing ids are skipped.
    async fn list_products(&self, ids: &[ProductId]) -> Result<Vec<Product>, CatalogError>;

    /// Insert a new product and return it with its generated id.
    async fn insert_product(&self, product: NewProduct) -> Result<Product, CatalogError>;

    /// Apply a partial update to a product and return the result.
    async fn update_product(
        &self,
        id: ProductId,
        update: &ProductUpdate,
    ) -> Result<Product, CatalogError>;

    /// Delete a product and every link pointing at it.
    ///
    /// Returns `false` if the product did not exist.
    async fn delete_product(&self, id: ProductId) -> Result<bool, CatalogError>;

    /// Count all products.
    async fn count_products(&self) -> Result<usize, CatalogError>;

    /// Retrieve the link for a product on a marketplace.
    async fn get_link(
        &self,
        product_id: ProductId,
        marketplace: Marketplace,
    ) -> Result<Option<MarketplaceLink>, CatalogError>;

    /// Find the link for an external id on a marketplace.
    async fn find_link_by_external_id(
        &self,
        marketplace: Marketplace,
        external_id: &str,
    ) -> Result<Option<MarketplaceLink>, CatalogError>;

    /// All links for a product.
    async fn links_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<MarketplaceLink>, CatalogError>;

    /// Insert or replace the link keyed by `(product_id, marketplace)`.
    async fn upsert_link(&self, link: MarketplaceLink) -> Result<(), CatalogError>;

    /// Apply a partial update to an existing link.
    async fn update_link(
        &self,
        product_id: ProductId,
        marketplace: Marketplace,
        update: &LinkUpdate,
    ) -> Result<(), CatalogError>;

    /// Delete every link matching the filter and return how many went.
    async fn delete_links(&self, filter: &LinkFilter) -> Result<usize, CatalogError>;

    /// Retrieve the stored credential for a marketplace.
    async fn get_credential(
        &self,
        marketplace: Marketplace,
    ) -> Result<Option<StoredCredential>, CatalogError>;

    /// Store credential material for a marketplace, replacing any previous value.
    async fn save_credential(
        &self,
        marketplace: Marketplace,
        credential: &Credential,
    ) -> Result<(), CatalogError>;

    /// Append an audit record.
    async fn append_log(&self, entry: NewSyncLog) -> Result<SyncLogEntry, CatalogError>;

    /// Audit records matching the query, newest first.
    async fn query_logs(&self, query: &LogQuery) -> Result<Vec<SyncLogEntry>, CatalogError>;

    /// Count audit records matching the query, ignoring its limit.
    async fn count_logs(&self, query: &LogQuery) -> Result<usize, CatalogError>;
}

/// Append an audit record, downgrading a store failure to a warning.
///
/// Audit logging never decides the outcome of the work being logged.
pub(crate) async fn record<C: CatalogStore + ?Sized>(catalog: &C, entry: NewSyncLog) {
    let marketplace = entry.marketplace;
    if let Err(e) = catalog.append_log(entry).await {
        tracing::warn!("Failed to write sync log for {}: {}", marketplace, e);
    }
}
