//! Top-level error types for marketsync.

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::credential::CredentialError;
use crate::import::ImportError;
use crate::marketplaces::MarketplaceError;
use crate::model::{Marketplace, ProductId};
use crate::token::TokenError;

/// Top-level error type encompassing all marketsync errors.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Error from catalog store operations.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Error from credential providers.
    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Error from token operations.
    #[error("token error: {0}")]
    Token(#[from] TokenError),

    /// Error from a marketplace API.
    #[error("marketplace error: {0}")]
    Marketplace(#[from] MarketplaceError),

    /// Error from an import run.
    #[error("import error: {0}")]
    Import(#[from] ImportError),

    /// No link exists for an external id on a marketplace.
    #[error("no {marketplace} listing with external id {external_id}")]
    LinkNotFound {
        marketplace: Marketplace,
        external_id: String,
    },

    /// The product does not exist.
    #[error("product not found: {0}")]
    ProductNotFound(ProductId),

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}
