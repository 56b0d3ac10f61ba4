//! In-memory catalog, optionally persisted as JSON.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::{CatalogError, CatalogStore};
use crate::credential::{Credential, StoredCredential};
use crate::model::{
    LinkFilter, LinkUpdate, LogQuery, Marketplace, MarketplaceLink, NewProduct, NewSyncLog,
    Product, ProductId, ProductUpdate, SyncLogEntry,
};

/// Serialized form of the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogData {
    /// Version of the file format (for future migrations).
    version: u32,
    products: BTreeMap<ProductId, Product>,
    links: Vec<MarketplaceLink>,
    credentials: BTreeMap<Marketplace, StoredCredential>,
    logs: Vec<SyncLogEntry>,
    next_log_id: u64,
}

impl Default for CatalogData {
    fn default() -> Self {
        Self {
            version: 1,
            products: BTreeMap::new(),
            links: Vec::new(),
            credentials: BTreeMap::new(),
            logs: Vec::new(),
            next_log_id: 1,
        }
    }
}

impl CatalogData {
    /// Reject `value` for `field` if another product already carries it.
    fn check_unique(
        &self,
        field: &'static str,
        value: &str,
        except: Option<ProductId>,
    ) -> Result<(), CatalogError> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(());
        }
        let taken = self.products.values().any(|p| {
            let existing = match field {
                "ean" => p.ean.trim(),
                _ => p.sku.trim(),
            };
            Some(p.id) != except && existing == value
        });
        if taken {
            return Err(CatalogError::Conflict {
                field,
                value: value.to_string(),
            });
        }
        Ok(())
    }
}

/// In-memory catalog store.
///
/// Created with [`new`](Self::new) it lives only as long as the process.
/// Created with [`load_from_path`](Self::load_from_path) it writes the
/// whole catalog back to that file after every mutation. A mutation whose
/// write fails is undone and returns the error.
///
/// # Thread Safety
///
/// Uses a `parking_lot::RwLock` internally and is safe to share across
/// tasks behind an `Arc`.
pub struct MemoryCatalog {
    data: RwLock<CatalogData>,
    path: Option<PathBuf>,
}

impl MemoryCatalog {
    /// Create a new empty, non-persistent catalog.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(CatalogData::default()),
            path: None,
        }
    }

    /// Load a catalog from a JSON file, creating parent directories.
    ///
    /// A missing file yields an empty catalog that is written on first change.
    pub fn load_from_path(path: impl Into<PathBuf>) -> Result<Self, CatalogError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let data = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            CatalogData::default()
        };

        Ok(Self {
            data: RwLock::new(data),
            path: Some(path),
        })
    }

    /// The backing file, if this catalog is persisted.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Apply `change` under the write lock and persist the result.
    ///
    /// A persisted catalog rolls the change back when the file cannot be
    /// written, so memory never runs ahead of disk.
    fn mutate<R>(
        &self,
        change: impl FnOnce(&mut CatalogData) -> Result<R, CatalogError>,
    ) -> Result<R, CatalogError> {
        let mut data = self.data.write();
        let Some(path) = &self.path else {
            return change(&mut *data);
        };

        let snapshot = data.clone();
        let written = change(&mut *data).and_then(|result| {
            let contents = serde_json::to_string_pretty(&*data)?;
            fs::write(path, contents)?;
            Ok(result)
        });
        if written.is_err() {
            *data = snapshot;
        }
        written
    }
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self.data.read();
        f.debug_struct("MemoryCatalog")
            .field("products", &data.products.len())
            .field("links", &data.links.len())
            .field("logs", &data.logs.len())
            .field("path", &self.path)
            .finish()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, CatalogError> {
        Ok(self.data.read().products.get(&id).cloned())
    }

    async fn find_product_by_ean(&self, ean: &str) -> Result<Option<Product>, CatalogError> {
        Ok(self
            .data
            .read()
            .products
            .values()
            .find(|p| !p.ean.is_empty() && p.ean == ean)
            .cloned())
    }

    async fn find_product_by_sku(&self, sku: &str) -> Result<Option<Product>, CatalogError> {
        Ok(self
            .data
            .read()
            .products
            .values()
            .find(|p| !p.sku.is_empty() && p.sku == sku)
            .cloned())
    }

    async fn list_products(&self, ids: &[ProductId]) -> Result<Vec<Product>, CatalogError> {
        let data = self.data.read();
        Ok(ids
            .iter()
            .filter_map(|id| data.products.get(id).cloned())
            .collect())
    }

    async fn insert_product(&self, product: NewProduct) -> Result<Product, CatalogError> {
        self.mutate(|data| {
            data.check_unique("ean", &product.ean, None)?;
            data.check_unique("sku", &product.sku, None)?;

            let now = Utc::now();
            let created = Product {
                id: ProductId::new(),
                title: product.title,
                description: product.description,
                sku: product.sku,
                ean: product.ean,
                price: product.price,
                quantity: product.quantity,
                weight: product.weight,
                images: product.images,
                status: product.status,
                shipping_type: product.shipping_type,
                created_at: now,
                updated_at: now,
            };
            data.products.insert(created.id, created.clone());
            Ok(created)
        })
    }

    async fn update_product(
        &self,
        id: ProductId,
        update: &ProductUpdate,
    ) -> Result<Product, CatalogError> {
        self.mutate(|data| {
            if let Some(ean) = &update.ean {
                data.check_unique("ean", ean, Some(id))?;
            }
            if let Some(sku) = &update.sku {
                data.check_unique("sku", sku, Some(id))?;
            }

            let product = data
                .products
                .get_mut(&id)
                .ok_or_else(|| CatalogError::product_not_found(id))?;
            update.apply_to(product);
            product.updated_at = Utc::now();
            Ok(product.clone())
        })
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool, CatalogError> {
        self.mutate(|data| {
            data.links.retain(|l| l.product_id != id);
            Ok(data.products.remove(&id).is_some())
        })
    }

    async fn count_products(&self) -> Result<usize, CatalogError> {
        Ok(self.data.read().products.len())
    }

    async fn get_link(
        &self,
        product_id: ProductId,
        marketplace: Marketplace,
    ) -> Result<Option<MarketplaceLink>, CatalogError> {
        Ok(self
            .data
            .read()
            .links
            .iter()
            .find(|l| l.product_id == product_id && l.marketplace == marketplace)
            .cloned())
    }

    async fn find_link_by_external_id(
        &self,
        marketplace: Marketplace,
        external_id: &str,
    ) -> Result<Option<MarketplaceLink>, CatalogError> {
        Ok(self
            .data
            .read()
            .links
            .iter()
            .find(|l| l.marketplace == marketplace && l.external_id == external_id)
            .cloned())
    }

    async fn links_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<MarketplaceLink>, CatalogError> {
        Ok(self
            .data
            .read()
            .links
            .iter()
            .filter(|l| l.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn upsert_link(&self, link: MarketplaceLink) -> Result<(), CatalogError> {
        self.mutate(|data| {
            if !data.products.contains_key(&link.product_id) {
                return Err(CatalogError::product_not_found(link.product_id));
            }

            match data
                .links
                .iter_mut()
                .find(|l| l.product_id == link.product_id && l.marketplace == link.marketplace)
            {
                Some(existing) => *existing = link,
                None => data.links.push(link),
            }
            Ok(())
        })
    }

    async fn update_link(
        &self,
        product_id: ProductId,
        marketplace: Marketplace,
        update: &LinkUpdate,
    ) -> Result<(), CatalogError> {
        self.mutate(|data| {
            let link = data
                .links
                .iter_mut()
                .find(|l| l.product_id == product_id && l.marketplace == marketplace)
                .ok_or_else(|| CatalogError::link_not_found(product_id, marketplace))?;

            if let Some(price) = update.price {
                link.price = price;
            }
            if let Some(quantity) = update.quantity {
                link.quantity = quantity;
            }
            if let Some(status) = update.sync_status {
                link.sync_status = status;
            }
            if let Some(at) = update.last_synced_at {
                link.last_synced_at = Some(at);
            }
            Ok(())
        })
    }

    async fn delete_links(&self, filter: &LinkFilter) -> Result<usize, CatalogError> {
        self.mutate(|data| {
            let before = data.links.len();
            data.links.retain(|l| !filter.matches(l));
            Ok(before - data.links.len())
        })
    }

    async fn get_credential(
        &self,
        marketplace: Marketplace,
    ) -> Result<Option<StoredCredential>, CatalogError> {
        Ok(self.data.read().credentials.get(&marketplace).cloned())
    }

    async fn save_credential(
        &self,
        marketplace: Marketplace,
        credential: &Credential,
    ) -> Result<(), CatalogError> {
        self.mutate(|data| {
            let now = Utc::now();
            match data.credentials.get_mut(&marketplace) {
                Some(stored) => {
                    stored.credentials = credential.clone();
                    stored.updated_at = now;
                }
                None => {
                    data.credentials.insert(
                        marketplace,
                        StoredCredential::new(marketplace, credential.clone()),
                    );
                }
            }
            Ok(())
        })
    }

    async fn append_log(&self, entry: NewSyncLog) -> Result<SyncLogEntry, CatalogError> {
        self.mutate(|data| {
            let appended = SyncLogEntry {
                id: data.next_log_id,
                marketplace: entry.marketplace,
                action: entry.action,
                status: entry.status,
                error_message: entry.error_message,
                created_at: Utc::now(),
            };
            data.next_log_id += 1;
            data.logs.push(appended.clone());
            Ok(appended)
        })
    }

    async fn query_logs(&self, query: &LogQuery) -> Result<Vec<SyncLogEntry>, CatalogError> {
        let data = self.data.read();
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(data
            .logs
            .iter()
            .rev()
            .filter(|e| query.matches(e))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count_logs(&self, query: &LogQuery) -> Result<usize, CatalogError> {
        Ok(self.data.read().logs.iter().filter(|e| query.matches(e)).count())
    }
}
