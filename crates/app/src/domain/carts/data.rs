//! Cart Data

use crate::domain::{pricing::data::Selections, products::records::ProductUuid};

/// New Cart Item Data
///
/// Adding the same product twice merges quantities into the existing line
/// and replaces its selections.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCartItem {
    pub product_uuid: ProductUuid,
    pub quantity: u64,
    pub selections: Selections,
}
