//! Product Data

use crate::domain::products::records::{BulkTier, ConfigVariant, ProductUuid, WarrantyOption};

/// New Product Data
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub uuid: ProductUuid,
    pub name: String,
    pub base_price: u64,
    pub b2b_price: Option<u64>,
    pub moq: u64,
    pub stock: u64,
    pub is_active: bool,
    pub bulk_tiers: Vec<BulkTier>,
    pub variants: Vec<ConfigVariant>,
    pub warranties: Vec<WarrantyOption>,
}

impl NewProduct {
    /// A plain active product with no wholesale price, tiers, or options.
    #[must_use]
    pub fn simple(uuid: ProductUuid, name: impl Into<String>, base_price: u64, stock: u64) -> Self {
        Self {
            uuid,
            name: name.into(),
            base_price,
            b2b_price: None,
            moq: 1,
            stock,
            is_active: true,
            bulk_tiers: Vec::new(),
            variants: Vec::new(),
            warranties: Vec::new(),
        }
    }
}

/// Product Update Data
///
/// Stock is deliberately absent; it moves only through the stock ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductUpdate {
    pub name: String,
    pub base_price: u64,
    pub b2b_price: Option<u64>,
    pub moq: u64,
    pub is_active: bool,
}
