//! Pricing

pub mod data;
pub mod engine;

pub use engine::{unit_price, variant_adjustment, warranty_price};
