//! Identity resolution and upsert of imported listings.

use chrono::Utc;
use tracing::{debug, warn};

use super::{ImportError, ImportedProduct};
use crate::catalog::{CatalogError, CatalogStore};
use crate::model::{
    LinkStatus, Marketplace, MarketplaceLink, NewProduct, Product, ProductId, ProductStatus,
    ProductUpdate, PLACEHOLDER_TITLE,
};

/// How an imported listing was matched to the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Matched an existing link for the same marketplace listing.
    Relinked(ProductId),

    /// Matched an existing product by EAN or SKU.
    Merged(ProductId),

    /// Created a new product.
    Created(ProductId),
}

impl UpsertOutcome {
    pub fn product_id(&self) -> ProductId {
        match self {
            Self::Relinked(id) | Self::Merged(id) | Self::Created(id) => *id,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Save one imported listing.
///
/// The product is found by, in order: an existing link for the same
/// `(marketplace, external_id)`, a matching non-empty EAN, a matching
/// non-empty SKU. Otherwise a new `imported` product is created. A reused
/// product only has its missing fields filled in. The link row is then
/// written as `synced` with the fetched price and quantity.
pub async fn upsert_imported<C: CatalogStore + ?Sized>(
    catalog: &C,
    marketplace: Marketplace,
    item: &ImportedProduct,
) -> Result<UpsertOutcome, ImportError> {
    let outcome = match resolve_existing(catalog, marketplace, item).await? {
        Some((product, relinked)) => {
            let mut backfill = backfill_for(&product, item);
            drop_foreign_identity(catalog, product.id, &mut backfill).await?;
            if !backfill.is_empty() {
                debug!("Back-filling product {} from {}", product.id, marketplace);
                match catalog.update_product(product.id, &backfill).await {
                    Ok(_) => {}
                    // Lost a race for the EAN or SKU; the link still gets written
                    Err(CatalogError::Conflict { field, value }) => warn!(
                        "Skipping back-fill of product {}: {} {} is taken",
                        product.id, field, value
                    ),
                    Err(e) => return Err(e.into()),
                }
            }
            if relinked {
                UpsertOutcome::Relinked(product.id)
            } else {
                UpsertOutcome::Merged(product.id)
            }
        }
        None => {
            let product = catalog.insert_product(new_product_from(item)).await?;
            debug!("Created product {} from {} {}", product.id, marketplace, item.external_id);
            UpsertOutcome::Created(product.id)
        }
    };

    catalog
        .upsert_link(MarketplaceLink {
            product_id: outcome.product_id(),
            marketplace,
            external_id: item.external_id.clone(),
            price: item.price,
            quantity: item.quantity,
            sync_status: LinkStatus::Synced,
            last_synced_at: Some(Utc::now()),
        })
        .await?;

    Ok(outcome)
}

async fn resolve_existing<C: CatalogStore + ?Sized>(
    catalog: &C,
    marketplace: Marketplace,
    item: &ImportedProduct,
) -> Result<Option<(Product, bool)>, ImportError> {
    if let Some(link) = catalog
        .find_link_by_external_id(marketplace, &item.external_id)
        .await?
    {
        if let Some(product) = catalog.get_product(link.product_id).await? {
            return Ok(Some((product, true)));
        }
    }

    if let Some(ean) = non_empty(&item.ean) {
        if let Some(product) = catalog.find_product_by_ean(ean).await? {
            return Ok(Some((product, false)));
        }
    }

    if let Some(sku) = non_empty(&item.sku) {
        if let Some(product) = catalog.find_product_by_sku(sku).await? {
            return Ok(Some((product, false)));
        }
    }

    Ok(None)
}

fn new_product_from(item: &ImportedProduct) -> NewProduct {
    NewProduct {
        title: non_empty(&item.title).unwrap_or(PLACEHOLDER_TITLE).to_string(),
        description: item.description.clone().unwrap_or_default(),
        sku: non_empty(&item.sku).unwrap_or_default().to_string(),
        ean: non_empty(&item.ean).unwrap_or_default().to_string(),
        price: item.price,
        quantity: item.quantity,
        weight: item.weight,
        images: item.images.clone(),
        shipping_type: None,
        status: ProductStatus::Imported,
    }
}

/// Remove a back-filled EAN or SKU that already belongs to another product.
async fn drop_foreign_identity<C: CatalogStore + ?Sized>(
    catalog: &C,
    product_id: ProductId,
    update: &mut ProductUpdate,
) -> Result<(), ImportError> {
    if let Some(sku) = update.sku.as_deref() {
        if let Some(owner) = catalog.find_product_by_sku(sku).await? {
            if owner.id != product_id {
                debug!("SKU {} belongs to product {}, not back-filling", sku, owner.id);
                update.sku = None;
            }
        }
    }
    if let Some(ean) = update.ean.as_deref() {
        if let Some(owner) = catalog.find_product_by_ean(ean).await? {
            if owner.id != product_id {
                debug!("EAN {} belongs to product {}, not back-filling", ean, owner.id);
                update.ean = None;
            }
        }
    }
    Ok(())
}

/// Fields of `product` that are missing and that `item` can supply.
fn backfill_for(product: &Product, item: &ImportedProduct) -> ProductUpdate {
    let mut update = ProductUpdate::default();

    if product.has_placeholder_title() {
        update.title = non_empty(&item.title).map(str::to_string);
    }
    if product.description.trim().is_empty() {
        update.description = non_empty(&item.description).map(str::to_string);
    }
    if product.sku.trim().is_empty() {
        update.sku = non_empty(&item.sku).map(str::to_string);
    }
    if product.ean.trim().is_empty() {
        update.ean = non_empty(&item.ean).map(str::to_string);
    }
    if product.images.is_empty() && !item.images.is_empty() {
        update.images = Some(item.images.clone());
    }
    if product.weight.is_none() {
        update.weight = item.weight;
    }

    update
}
