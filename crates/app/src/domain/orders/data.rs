//! Order Data Transfer Objects

use crate::domain::{
    buyers::records::BuyerUuid,
    orders::records::{DeliveryDetails, PaymentMethod},
    pricing::data::Selections,
    products::records::ProductUuid,
};

/// Checkout request.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub buyer_uuid: BuyerUuid,
    pub payment_method: PaymentMethod,
    pub delivery: DeliveryDetails,
    pub source: OrderSource,
}

/// Where the order's lines come from.
#[derive(Debug, Clone)]
pub enum OrderSource {
    /// Check out the buyer's cart; the cart is emptied on success.
    Cart,
    /// Direct line items, priced at creation time.
    Lines(Vec<NewOrderLine>),
}

/// A single requested line for a direct (cart-less) order.
#[derive(Debug, Clone)]
pub struct NewOrderLine {
    pub product_uuid: ProductUuid,
    pub quantity: u64,
    pub selections: Selections,
}
