//! Payments service errors.

use sqlx::Error;
use thiserror::Error;

use crate::domain::{
    orders::records::{OrderStatus, OrderUuid},
    payments::gateway::GatewayError,
    products::records::ProductUuid,
    stock::errors::StockError,
};

#[derive(Debug, Error)]
pub enum PaymentsServiceError {
    /// The gateway has no record of the payment id.
    #[error("payment not found")]
    PaymentNotFound,

    /// The payment's metadata no longer carries an order id. Needs manual
    /// reconciliation.
    #[error("payment carries no order correlation")]
    OrderCorrelationMissing,

    #[error("order not found")]
    OrderNotFound,

    /// The gateway payment id is already recorded against a different
    /// order. A data-integrity violation, never resolved silently.
    #[error("payment is recorded against order {recorded}, gateway says {reported}")]
    MismatchedOrder {
        recorded: OrderUuid,
        reported: OrderUuid,
    },

    #[error("order is not payable through the gateway")]
    NotGatewayPayable,

    /// A payment report arrived for an order already in a terminal state
    /// (cancelled while the payment was in flight, typically). The
    /// transaction is recorded for manual reconciliation; the order's
    /// status and stock are left untouched.
    #[error("order {order} is {status}; payment needs manual reconciliation")]
    InvalidOrderState {
        order: OrderUuid,
        status: OrderStatus,
    },

    #[error("insufficient stock for {product}: {available} available, {requested} requested")]
    InsufficientStock {
        product: ProductUuid,
        available: u64,
        requested: u64,
    },

    #[error("gateway error")]
    Gateway(#[source] GatewayError),

    #[error("storage error")]
    Sql(#[from] Error),
}

impl From<GatewayError> for PaymentsServiceError {
    fn from(error: GatewayError) -> Self {
        match error {
            GatewayError::NotFound => Self::PaymentNotFound,
            other => Self::Gateway(other),
        }
    }
}

impl From<StockError> for PaymentsServiceError {
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
            StockError::ProductNotFound(_) => Self::OrderNotFound,
            StockError::Sql(error) => Self::Sql(error),
        }
    }
}
