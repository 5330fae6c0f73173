//! Cart Records

use jiff::Timestamp;

use crate::{
    domain::{buyers::records::BuyerUuid, pricing::data::Selections, products::records::ProductUuid},
    uuids::TypedUuid,
};

/// Cart UUID
pub type CartUuid = TypedUuid<CartRecord>;

/// Cart Record
///
/// One cart per buyer, created lazily on first access and emptied (not
/// deleted) on successful checkout. Line prices are snapshots of the current
/// catalog and are recomputed on every read until checkout freezes them.
#[derive(Debug, Clone)]
pub struct CartRecord {
    pub uuid: CartUuid,
    pub buyer_uuid: BuyerUuid,
    pub total_amount: u64,
    pub items: Vec<CartItemRecord>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Cart Item UUID
pub type CartItemUuid = TypedUuid<CartItemRecord>;

/// Cart Item Record
#[derive(Debug, Clone)]
pub struct CartItemRecord {
    pub uuid: CartItemUuid,
    pub product_uuid: ProductUuid,
    pub quantity: u64,
    pub unit_price: u64,
    pub total_price: u64,
    pub selections: Selections,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
