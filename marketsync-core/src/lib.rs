//! # marketsync core
//!
//! Catalog sync engine keeping one central product catalog in step with
//! Otto, eBay, Kaufland and Shopify.
//!
//! This crate provides:
//! - Domain types for products, marketplace links and the sync log
//! - A catalog store trait with an in-memory (optionally file-backed) store
//! - Credential providers and a token manager with cached OAuth2 tokens
//! - Importers pulling marketplace listings into the catalog
//! - Exporters creating and updating marketplace listings
//! - A sync service fanning central edits out to every linked marketplace
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use marketsync_core::{Price, ProductUpdate, ProductId, SyncService};
//!
//! async fn reprice(sync: &SyncService, id: ProductId) -> Result<(), marketsync_core::SyncError> {
//!     let report = sync
//!         .apply_central_update(id, &ProductUpdate::price(Price::from_cents(1250)))
//!         .await?;
//!     for (marketplace, result) in report.failed() {
//!         eprintln!("{}: {:?}", marketplace, result.error);
//!     }
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod credential;
pub mod endpoints;
pub mod error;
pub mod export;
pub mod import;
pub mod marketplaces;
pub mod model;
pub mod price;
pub mod signing;
pub mod sync;
pub mod token;
pub mod token_manager;

// Re-export commonly used types at crate root
pub use model::{
    AuthScheme,
    LinkStatus,
    LogQuery,
    LogStatus,
    Marketplace,
    MarketplaceLink,
    NewProduct,
    Product,
    ProductId,
    ProductStatus,
    ProductUpdate,
    SyncAction,
    SyncLogEntry,
    PLACEHOLDER_TITLE,
};

pub use price::Price;

pub use catalog::{
    CatalogError,
    CatalogStore,
    MemoryCatalog,
};

pub use credential::{
    CatalogCredentials,
    Credential,
    CredentialChain,
    CredentialError,
    CredentialProvider,
    EnvCredentials,
    Secret,
};

pub use endpoints::{EndpointConfig, EndpointOverride, EndpointRegistry};

pub use token::{
    AuthContext,
    TokenError,
    TokenManager,
    MOCK_TOKEN,
};

pub use token_manager::DefaultTokenManager;

pub use import::{
    import_all,
    ImportControl,
    ImportError,
    ImportOutcome,
    ImportSource,
    Importer,
};

pub use export::{ExportResult, Exporter, ListingApi, ListingRef};

pub use marketplaces::{build_clients, AdapterSettings, MarketplaceClients, MarketplaceError};

pub use sync::{BatchReport, DeleteReport, FanOutReport, SyncService};

pub use error::SyncError;
