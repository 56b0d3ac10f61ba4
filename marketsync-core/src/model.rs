//! Domain model types for marketsync.
//!
//! This module defines the records shared by every component:
//! - [`Marketplace`] - The closed set of supported marketplaces
//! - [`Product`] - The canonical catalog record
//! - [`MarketplaceLink`] - A product's listing on one marketplace
//! - [`SyncLogEntry`] - Append-only audit record
//! - [`ProductUpdate`] - Partial update payload pushed to marketplaces

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::price::Price;

/// Title given to products whose source listing carries no title.
///
/// Import back-fill treats this value as missing.
pub const PLACEHOLDER_TITLE: &str = "Untitled product";

/// A supported marketplace.
///
/// The set is closed; adding a marketplace means adding a variant and an
/// adapter in [`crate::marketplaces`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Marketplace {
    Otto,
    Ebay,
    Kaufland,
    Shopify,
}

/// How requests to a marketplace are authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// OAuth2 client-credentials grant producing a bearer token.
    ClientCredentials,

    /// Static client key plus per-request HMAC signature.
    HmacSigned,

    /// Static API key or access token sent as-is.
    ApiKey,
}

impl Marketplace {
    /// All marketplaces, in the order scheduled imports run.
    pub const ALL: [Marketplace; 4] = [
        Marketplace::Otto,
        Marketplace::Ebay,
        Marketplace::Kaufland,
        Marketplace::Shopify,
    ];

    /// Get the marketplace identifier used in storage and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Otto => "otto",
            Self::Ebay => "ebay",
            Self::Kaufland => "kaufland",
            Self::Shopify => "shopify",
        }
    }

    /// The authentication scheme this marketplace uses.
    pub fn auth_scheme(&self) -> AuthScheme {
        match self {
            Self::Otto | Self::Ebay => AuthScheme::ClientCredentials,
            Self::Kaufland => AuthScheme::HmacSigned,
            Self::Shopify => AuthScheme::ApiKey,
        }
    }
}

impl fmt::Display for Marketplace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing an unknown marketplace name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown marketplace: {0}")]
pub struct UnknownMarketplace(pub String);

impl FromStr for Marketplace {
    type Err = UnknownMarketplace;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "otto" => Ok(Self::Otto),
            "ebay" => Ok(Self::Ebay),
            "kaufland" => Ok(Self::Kaufland),
            "shopify" => Ok(Self::Shopify),
            other => Err(UnknownMarketplace(other.to_string())),
        }
    }
}

/// Stable identity of a canonical product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(Uuid);

impl ProductId {
    /// Generate a fresh product id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ProductId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProductId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

impl From<Uuid> for ProductId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Lifecycle state of a canonical product.
///
/// Every state may be published. Stored values outside these three are
/// rejected when the record is read, so the exporter never sees them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    /// Created from raw marketplace data.
    #[default]
    Imported,

    /// Content curated (manually or by rewriting).
    Optimized,

    /// Listed on at least one marketplace through a publish.
    Published,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Imported => "imported",
            Self::Optimized => "optimized",
            Self::Published => "published",
        }
    }
}

impl fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The canonical product record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    pub description: String,
    pub sku: String,
    pub ean: String,
    pub price: Price,
    pub quantity: u32,
    /// Weight in kilograms, if known.
    pub weight: Option<f64>,
    /// Image URLs in display order.
    pub images: Vec<String>,
    pub status: ProductStatus,
    pub shipping_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Whether the title is missing or still the import placeholder.
    pub fn has_placeholder_title(&self) -> bool {
        let title = self.title.trim();
        title.is_empty() || title == PLACEHOLDER_TITLE
    }

    /// The fields a forced re-sync pushes to every marketplace.
    pub fn snapshot_update(&self) -> ProductUpdate {
        ProductUpdate {
            title: Some(self.title.clone()),
            description: Some(self.description.clone()),
            price: Some(self.price),
            quantity: Some(self.quantity),
            ..ProductUpdate::default()
        }
    }
}

/// Data for inserting a new product.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewProduct {
    pub title: String,
    pub description: String,
    pub sku: String,
    pub ean: String,
    pub price: Price,
    pub quantity: u32,
    pub weight: Option<f64>,
    pub images: Vec<String>,
    pub shipping_type: Option<String>,
    pub status: ProductStatus,
}

/// Partial update for a product.
///
/// Used both as the central edit payload and as the payload pushed to
/// each marketplace. A field is applied when it is `Some`, including zero
/// values such as `Some(0)` for quantity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProductUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Price>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ean: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ProductStatus>,
}

impl ProductUpdate {
    /// An update carrying only a quantity.
    pub fn quantity(quantity: u32) -> Self {
        Self {
            quantity: Some(quantity),
            ..Self::default()
        }
    }

    /// An update carrying only a price.
    pub fn price(price: Price) -> Self {
        Self {
            price: Some(price),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Whether this edit touches a field that marketplaces mirror.
    pub fn touches_listing(&self) -> bool {
        self.price.is_some()
            || self.quantity.is_some()
            || self.title.is_some()
            || self.description.is_some()
    }

    /// Apply the present fields to a product in place.
    pub fn apply_to(&self, product: &mut Product) {
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(quantity) = self.quantity {
            product.quantity = quantity;
        }
        if let Some(title) = &self.title {
            product.title = title.clone();
        }
        if let Some(description) = &self.description {
            product.description = description.clone();
        }
        if let Some(weight) = self.weight {
            product.weight = Some(weight);
        }
        if let Some(images) = &self.images {
            product.images = images.clone();
        }
        if let Some(shipping_type) = &self.shipping_type {
            product.shipping_type = Some(shipping_type.clone());
        }
        if let Some(sku) = &self.sku {
            product.sku = sku.clone();
        }
        if let Some(ean) = &self.ean {
            product.ean = ean.clone();
        }
        if let Some(status) = self.status {
            product.status = status;
        }
    }
}

/// Sync state of a marketplace link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Pending,
    Synced,
    Failed,
}

/// A product's listing on one marketplace.
///
/// Unique per `(product_id, marketplace)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketplaceLink {
    pub product_id: ProductId,
    pub marketplace: Marketplace,
    pub external_id: String,
    /// Last price known to be on the marketplace.
    pub price: Price,
    /// Last quantity known to be on the marketplace.
    pub quantity: u32,
    pub sync_status: LinkStatus,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl MarketplaceLink {
    /// A freshly synced link stamped with the current time.
    pub fn synced(
        product_id: ProductId,
        marketplace: Marketplace,
        external_id: impl Into<String>,
        price: Price,
        quantity: u32,
    ) -> Self {
        Self {
            product_id,
            marketplace,
            external_id: external_id.into(),
            price,
            quantity,
            sync_status: LinkStatus::Synced,
            last_synced_at: Some(Utc::now()),
        }
    }
}

/// Partial update of a link row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LinkUpdate {
    pub price: Option<Price>,
    pub quantity: Option<u32>,
    pub sync_status: Option<LinkStatus>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Filter for bulk link deletion.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LinkFilter {
    pub product_ids: Option<Vec<ProductId>>,
    pub marketplace: Option<Marketplace>,
}

impl LinkFilter {
    pub fn marketplace(marketplace: Marketplace) -> Self {
        Self {
            marketplace: Some(marketplace),
            ..Self::default()
        }
    }

    pub fn products(ids: Vec<ProductId>) -> Self {
        Self {
            product_ids: Some(ids),
            ..Self::default()
        }
    }

    pub fn matches(&self, link: &MarketplaceLink) -> bool {
        let by_product = self
            .product_ids
            .as_ref()
            .map(|ids| ids.contains(&link.product_id))
            .unwrap_or(true);
        let by_marketplace = self
            .marketplace
            .map(|m| m == link.marketplace)
            .unwrap_or(true);
        by_product && by_marketplace
    }
}

/// Kind of work recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Import,
    Export,
    Update,
}

/// Outcome recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    Pending,
    Success,
    Synced,
    Failed,
}

impl LogStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// An audit log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub id: u64,
    pub marketplace: Marketplace,
    pub action: SyncAction,
    pub status: LogStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Data for appending an audit log record.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSyncLog {
    pub marketplace: Marketplace,
    pub action: SyncAction,
    pub status: LogStatus,
    pub error_message: Option<String>,
}

impl NewSyncLog {
    pub fn new(marketplace: Marketplace, action: SyncAction, status: LogStatus) -> Self {
        Self {
            marketplace,
            action,
            status,
            error_message: None,
        }
    }

    pub fn failed(marketplace: Marketplace, action: SyncAction, message: impl Into<String>) -> Self {
        Self {
            marketplace,
            action,
            status: LogStatus::Failed,
            error_message: Some(message.into()),
        }
    }
}

/// Query over the audit log.
///
/// Results are ordered newest first.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LogQuery {
    pub marketplace: Option<Marketplace>,
    /// Inclusive lower bound.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl LogQuery {
    pub fn matches(&self, entry: &SyncLogEntry) -> bool {
        self.marketplace.map(|m| m == entry.marketplace).unwrap_or(true)
            && self.since.map(|s| entry.created_at >= s).unwrap_or(true)
            && self.until.map(|u| entry.created_at < u).unwrap_or(true)
    }
}
