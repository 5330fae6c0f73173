//! Order Records

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::{
    domain::{buyers::records::BuyerUuid, pricing::data::Selections, products::records::ProductUuid},
    uuids::TypedUuid,
};

/// Order UUID
pub type OrderUuid = TypedUuid<OrderRecord>;

/// Order Record
///
/// Prices are frozen into the items at creation time and never recomputed
/// from the live catalog afterwards.
#[derive(Debug, Clone)]
pub struct OrderRecord {
    pub uuid: OrderUuid,
    pub buyer_uuid: BuyerUuid,

    /// Short human-facing identifier, unique per tenant.
    pub display_id: String,

    /// Assigned once, only after the order is paid.
    pub invoice_number: Option<String>,

    pub order_type: OrderType,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub total_amount: u64,
    pub delivery: DeliveryDetails,
    pub items: Vec<OrderItemRecord>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Order Item UUID
pub type OrderItemUuid = TypedUuid<OrderItemRecord>;

/// Order Item Record
#[derive(Debug, Clone)]
pub struct OrderItemRecord {
    pub uuid: OrderItemUuid,
    pub product_uuid: ProductUuid,
    pub quantity: u64,

    /// Unit price frozen at order creation.
    pub price_at_purchase: u64,

    pub selections: Selections,
    pub created_at: Timestamp,
}

/// Delivery address and contact details, stored on the order as a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryDetails {
    pub recipient: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Fulfilment state of an order.
///
/// `Delivered` and `Cancelled` are terminal. Beyond that the workflow is
/// deliberately loose: any non-terminal state may move to any other state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Approved,
    Packed,
    OutForDelivery,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Packed => "packed",
            Self::OutForDelivery => "out_for_delivery",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "packed" => Some(Self::Packed),
            "out_for_delivery" => Some(Self::OutForDelivery),
            "shipped" => Some(Self::Shipped),
            "delivered" => Some(Self::Delivered),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Terminal states admit no further transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment state of an order, tracked independently of fulfilment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }

    #[must_use]
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            "failed" => Some(Self::Failed),
            "refunded" => Some(Self::Refunded),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived strictly from the buyer's role at creation time, never taken from
/// the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    B2b,
    B2c,
}

impl OrderType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::B2b => "b2b",
            Self::B2c => "b2c",
        }
    }

    #[must_use]
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "b2b" => Some(Self::B2b),
            "b2c" => Some(Self::B2c),
            _ => None,
        }
    }
}

/// How the order is paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    /// Settled on delivery; the order is confirmed and stock deducted at
    /// creation time.
    CashOnDelivery,
    /// Settled through the external gateway; the order stays pending until
    /// payment reconciliation confirms it.
    Gateway,
}

impl PaymentMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CashOnDelivery => "cod",
            Self::Gateway => "gateway",
        }
    }

    #[must_use]
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "cod" => Some(Self::CashOnDelivery),
            "gateway" => Some(Self::Gateway),
            _ => None,
        }
    }
}
