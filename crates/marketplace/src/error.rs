//! Marketplace error types.

use domain::{DomainError, ProductId};
use projections::ProjectionError;
use thiserror::Error;

use crate::services::CartLineId;

/// Errors raised while orchestrating checkout, fulfillment and trades.
#[derive(Debug, Error)]
pub enum MarketplaceError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Insufficient stock for {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// A conditional stock write lost against another writer.
    #[error("Stock of {product_id} changed concurrently, {available} left")]
    StockConflict {
        product_id: ProductId,
        available: u32,
    },

    /// A requested cart line does not match what is in the cart.
    #[error("Cart line {line_id} cannot be ordered: {reason}")]
    StaleCartLine { line_id: CartLineId, reason: String },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Projection error: {0}")]
    Projection(#[from] ProjectionError),

    /// A catalog, cart or account backend failed.
    #[error("Collaborator error: {0}")]
    Collaborator(String),
}

impl MarketplaceError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        MarketplaceError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Convenience type alias for marketplace results.
pub type Result<T> = std::result::Result<T, MarketplaceError>;
