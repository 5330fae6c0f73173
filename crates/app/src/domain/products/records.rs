//! Product Records

use jiff::Timestamp;

use crate::uuids::TypedUuid;

/// Product UUID
pub type ProductUuid = TypedUuid<ProductRecord>;

/// Product Record
///
/// Stock is mutated only through the stock ledger; everything else is
/// read-mostly catalog data.
#[derive(Debug, Clone)]
pub struct ProductRecord {
    pub uuid: ProductUuid,
    pub name: String,

    /// Retail unit price in minor units.
    pub base_price: u64,

    /// Wholesale unit price, applied only at or above [`Self::moq`].
    pub b2b_price: Option<u64>,

    /// Minimum order quantity for wholesale pricing.
    pub moq: u64,

    /// Units on hand. Never negative.
    pub stock: u64,

    pub is_active: bool,

    /// Quantity-break prices; the highest qualifying tier replaces the base
    /// price outright.
    pub bulk_tiers: Vec<BulkTier>,

    /// Configuration variants (RAM, storage) with signed price adjustments.
    pub variants: Vec<ConfigVariant>,

    /// Extended warranty options priced per duration.
    pub warranties: Vec<WarrantyOption>,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
}

/// Bulk Pricing Tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkTier {
    pub min_qty: u64,
    pub price: u64,
}

/// Configuration Variant Kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantKind {
    Ram,
    Storage,
}

impl VariantKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ram => "ram",
            Self::Storage => "storage",
        }
    }

    #[must_use]
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "ram" => Some(Self::Ram),
            "storage" => Some(Self::Storage),
            _ => None,
        }
    }
}

/// Configuration Variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigVariant {
    pub kind: VariantKind,
    pub value: String,
    pub price_adjustment: i64,
}

/// Warranty Option
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarrantyOption {
    pub duration: String,
    pub price: u64,
}
