//! Orders service errors.

use sqlx::{
    Error,
    error::{DatabaseError, ErrorKind},
};
use thiserror::Error;

use crate::domain::{
    orders::records::OrderStatus,
    products::records::ProductUuid,
    stock::errors::StockError,
};

#[derive(Debug, Error)]
pub enum OrdersServiceError {
    #[error("order not found")]
    NotFound,

    #[error("buyer not found")]
    BuyerNotFound,

    #[error("product {0} not found")]
    ProductNotFound(ProductUuid),

    #[error("product {0} is not available")]
    ProductInactive(ProductUuid),

    #[error("cannot create an order without items")]
    EmptyOrder,

    #[error("insufficient stock for {product}: {available} available, {requested} requested")]
    InsufficientStock {
        product: ProductUuid,
        available: u64,
        requested: u64,
    },

    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("related resource not found")]
    InvalidReference,

    #[error("invalid data")]
    InvalidData,

    #[error("storage error")]
    Sql(#[source] Error),
}

impl From<Error> for OrdersServiceError {
    fn from(error: Error) -> Self {
        if matches!(error, Error::RowNotFound) {
            return Self::NotFound;
        }

        match error.as_database_error().map(DatabaseError::kind) {
            Some(ErrorKind::ForeignKeyViolation) => Self::InvalidReference,
            Some(ErrorKind::CheckViolation) => Self::InvalidData,
            _ => Self::Sql(error),
        }
    }
}

impl From<StockError> for OrdersServiceError {
    fn from(error: StockError) -> Self {
        match error {
            StockError::InsufficientStock {
                product,
                available,
                requested,
            } => Self::InsufficientStock {
                product,
                available,
                requested,
            },
            StockError::ProductNotFound(product) => Self::ProductNotFound(product),
            StockError::Sql(error) => Self::Sql(error),
        }
    }
}
