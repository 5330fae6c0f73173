//! Carts service errors.

use sqlx::{
    Error,
    error::{DatabaseError, ErrorKind},
};
use thiserror::Error;

use crate::domain::products::records::ProductUuid;

#[derive(Debug, Error)]
pub enum CartsServiceError {
    #[error("cart not found")]
    NotFound,

    #[error("buyer not found")]
    BuyerNotFound,

    #[error("product not found")]
    ProductNotFound,

    #[error("product is inactive")]
    ProductInactive,

    #[error("item not in cart")]
    ItemNotFound,

    #[error("quantity must be at least 1")]
    InvalidQuantity,

    /// Recoverable: the buyer can retry with a smaller quantity.
    #[error("insufficient stock for product {product}: {available} available, {requested} requested")]
    InsufficientStock {
        product: ProductUuid,
        available: u64,
        requested: u64,
    },

    #[error("storage error")]
    Sql(#[source] Error),
}

impl From<Error> for CartsServiceError {
    fn from(error: Error) -> Self {
        if matches!(error, Error::RowNotFound) {
            return Self::NotFound;
        }

        match error.as_database_error().map(DatabaseError::kind) {
            Some(ErrorKind::ForeignKeyViolation) => Self::ProductNotFound,
            _ => Self::Sql(error),
        }
    }
}
