//! Payment Records

use jiff::Timestamp;

use crate::{
    domain::{
        buyers::records::BuyerUuid, orders::records::OrderUuid,
        payments::gateway::GatewayPaymentStatus,
    },
    uuids::TypedUuid,
};

/// Transaction UUID
pub type TransactionUuid = TypedUuid<TransactionRecord>;

/// Transaction Record
///
/// One row per gateway payment id. Repeated verifications of the same
/// payment update this row in place rather than creating duplicate
/// financial records.
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub uuid: TransactionUuid,
    pub order_uuid: OrderUuid,
    pub buyer_uuid: BuyerUuid,
    pub gateway_payment_id: String,
    pub amount: u64,
    pub status: TransactionStatus,

    /// Raw gateway payload, kept for manual reconciliation.
    pub metadata: serde_json::Value,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
    Refunded,
}

impl TransactionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }

    #[must_use]
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "refunded" => Some(Self::Refunded),
            _ => None,
        }
    }
}

impl From<GatewayPaymentStatus> for TransactionStatus {
    fn from(status: GatewayPaymentStatus) -> Self {
        match status {
            GatewayPaymentStatus::Success => Self::Success,
            GatewayPaymentStatus::Pending => Self::Pending,
            GatewayPaymentStatus::Failed => Self::Failed,
        }
    }
}
