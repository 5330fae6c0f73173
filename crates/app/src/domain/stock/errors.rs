//! Stock ledger errors.

use thiserror::Error;

use crate::domain::products::records::ProductUuid;

#[derive(Debug, Error)]
pub enum StockError {
    /// The conditional decrement found fewer units than requested. Carries
    /// enough context for the caller to tell the buyer what to change.
    #[error("insufficient stock for product {product}: {available} available, {requested} requested")]
    InsufficientStock {
        product: ProductUuid,
        available: u64,
        requested: u64,
    },

    #[error("product {0} not found")]
    ProductNotFound(ProductUuid),

    #[error("storage error")]
    Sql(#[from] sqlx::Error),
}
