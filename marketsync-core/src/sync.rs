//! Fan-out of product changes to every linked marketplace.
//!
//! Forward direction: a central edit is pushed to each marketplace the
//! product is listed on. Reverse direction: a stock change reported by one
//! marketplace is written to the canonical product and pushed to every
//! *other* linked marketplace, never back to its source.
//!
//! Each marketplace call runs as its own task in a [`JoinSet`]; the fan-out
//! waits for all of them, so one failing (or panicking) marketplace never
//! changes the outcome recorded for its siblings.

use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::catalog::CatalogStore;
use crate::error::SyncError;
use crate::export::{ExportResult, Exporter};
use crate::model::{LinkFilter, LinkStatus, LinkUpdate, Marketplace, ProductId, ProductUpdate};

/// Per-marketplace outcome of one fan-out.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FanOutReport {
    pub product_id: Option<ProductId>,
    pub outcomes: BTreeMap<Marketplace, ExportResult>,
}

impl FanOutReport {
    fn for_product(product_id: ProductId) -> Self {
        Self {
            product_id: Some(product_id),
            outcomes: BTreeMap::new(),
        }
    }

    /// Whether every dispatched update succeeded (vacuously true when none).
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.values().all(|r| r.success)
    }

    pub fn failed(&self) -> impl Iterator<Item = (&Marketplace, &ExportResult)> {
        self.outcomes.iter().filter(|(_, r)| !r.success)
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Outcome of a batch re-sync.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub synced: BTreeMap<ProductId, FanOutReport>,
    /// Requested ids with no product behind them.
    pub missing: Vec<ProductId>,
}

/// Outcome of a product deletion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub products: usize,
    pub links: usize,
}

/// Propagates product changes between the catalog and the marketplaces.
pub struct SyncService {
    catalog: Arc<dyn CatalogStore>,
    exporters: HashMap<Marketplace, Arc<Exporter>>,
}

impl SyncService {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self {
            catalog,
            exporters: HashMap::new(),
        }
    }

    /// Register the exporter for its marketplace, replacing any previous one.
    pub fn with_exporter(mut self, exporter: Exporter) -> Self {
        self.exporters.insert(exporter.marketplace(), Arc::new(exporter));
        self
    }

    pub fn exporter(&self, marketplace: Marketplace) -> Option<&Arc<Exporter>> {
        self.exporters.get(&marketplace)
    }

    /// Push `updates` to every marketplace the product is linked to.
    pub async fn sync_product_update_to_all(
        &self,
        product_id: ProductId,
        updates: &ProductUpdate,
    ) -> Result<FanOutReport, SyncError> {
        self.fan_out(product_id, updates, None).await
    }

    /// Apply a stock change reported by `marketplace`.
    ///
    /// The canonical quantity and the source link's snapshot take the new
    /// value; the change then fans out to every other linked marketplace.
    pub async fn handle_incoming_stock_update(
        &self,
        marketplace: Marketplace,
        external_id: &str,
        quantity: u32,
    ) -> Result<FanOutReport, SyncError> {
        let link = self
            .catalog
            .find_link_by_external_id(marketplace, external_id)
            .await?
            .ok_or_else(|| SyncError::LinkNotFound {
                marketplace,
                external_id: external_id.to_string(),
            })?;

        info!(
            "Stock update from {} for {}: quantity {}",
            marketplace, link.product_id, quantity
        );

        let updates = ProductUpdate::quantity(quantity);
        self.catalog.update_product(link.product_id, &updates).await?;
        self.catalog
            .update_link(
                link.product_id,
                marketplace,
                &LinkUpdate {
                    quantity: Some(quantity),
                    sync_status: Some(LinkStatus::Synced),
                    last_synced_at: Some(Utc::now()),
                    ..LinkUpdate::default()
                },
            )
            .await?;

        self.fan_out(link.product_id, &updates, Some(marketplace)).await
    }

    /// Write a central edit to the product, then push it out when a
    /// mirrored field changed.
    pub async fn apply_central_update(
        &self,
        product_id: ProductId,
        updates: &ProductUpdate,
    ) -> Result<FanOutReport, SyncError> {
        if self.catalog.get_product(product_id).await?.is_none() {
            return Err(SyncError::ProductNotFound(product_id));
        }
        if updates.is_empty() {
            return Ok(FanOutReport::for_product(product_id));
        }

        self.catalog.update_product(product_id, updates).await?;

        if !updates.touches_listing() {
            debug!("Edit of {} touches no mirrored field, not syncing", product_id);
            return Ok(FanOutReport::for_product(product_id));
        }
        self.fan_out(product_id, updates, None).await
    }

    /// Re-push the current title, description, price and quantity of each
    /// product to all its links.
    pub async fn sync_batch(&self, product_ids: &[ProductId]) -> Result<BatchReport, SyncError> {
        let products = self.catalog.list_products(product_ids).await?;
        let found: BTreeSet<ProductId> = products.iter().map(|p| p.id).collect();

        let mut report = BatchReport {
            missing: product_ids
                .iter()
                .filter(|id| !found.contains(id))
                .copied()
                .collect(),
            ..BatchReport::default()
        };
        for id in &report.missing {
            warn!("Batch sync skipped unknown product {}", id);
        }

        for product in products {
            let outcome = self.fan_out(product.id, &product.snapshot_update(), None).await?;
            report.synced.insert(product.id, outcome);
        }

        Ok(report)
    }

    /// Delete products together with their links.
    pub async fn delete_products(&self, product_ids: &[ProductId]) -> Result<DeleteReport, SyncError> {
        let links = self
            .catalog
            .delete_links(&LinkFilter::products(product_ids.to_vec()))
            .await?;

        let mut products = 0;
        for id in product_ids {
            if self.catalog.delete_product(*id).await? {
                products += 1;
            }
        }

        info!("Deleted {} products and {} links", products, links);
        Ok(DeleteReport { products, links })
    }

    /// Remove every link to one marketplace. Products stay.
    pub async fn cleanup_marketplace(&self, marketplace: Marketplace) -> Result<usize, SyncError> {
        let removed = self
            .catalog
            .delete_links(&LinkFilter::marketplace(marketplace))
            .await?;
        info!("Removed {} {} links", removed, marketplace);
        Ok(removed)
    }

    async fn fan_out(
        &self,
        product_id: ProductId,
        updates: &ProductUpdate,
        exclude: Option<Marketplace>,
    ) -> Result<FanOutReport, SyncError> {
        let links = self.catalog.links_for_product(product_id).await?;
        let mut report = FanOutReport::for_product(product_id);
        let mut join_set = JoinSet::new();
        let mut dispatched = BTreeSet::new();

        for link in links {
            if Some(link.marketplace) == exclude {
                continue;
            }
            let Some(exporter) = self.exporters.get(&link.marketplace).cloned() else {
                warn!("No exporter for {}, skipping link of {}", link.marketplace, product_id);
                report.outcomes.insert(
                    link.marketplace,
                    ExportResult::failed(format!("{} is not configured", link.marketplace)),
                );
                continue;
            };

            dispatched.insert(link.marketplace);
            let updates = updates.clone();
            join_set.spawn(async move {
                let result = exporter.update_product(product_id, &updates).await;
                (exporter.marketplace(), result)
            });
        }

        debug!("Fanning out {} to {} marketplaces", product_id, dispatched.len());

        let mut task_errors = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((marketplace, result)) => {
                    if let Some(message) = &result.error {
                        warn!("Sync of {} to {} failed: {}", product_id, marketplace, message);
                    }
                    report.outcomes.insert(marketplace, result);
                }
                Err(e) => {
                    error!("Sync task for {} panicked: {}", product_id, e);
                    task_errors.push(e.to_string());
                }
            }
        }

        // A panicked task never reports its marketplace; charge the failure
        // to whichever dispatched marketplace has no outcome.
        if !task_errors.is_empty() {
            let message = format!("update task failed: {}", task_errors.join("; "));
            for marketplace in dispatched {
                if report.outcomes.contains_key(&marketplace) {
                    continue;
                }
                if let Some(exporter) = self.exporters.get(&marketplace) {
                    exporter.record_failure(product_id, &message).await;
                }
                report
                    .outcomes
                    .insert(marketplace, ExportResult::failed(message.clone()));
            }
        }

        Ok(report)
    }
}
