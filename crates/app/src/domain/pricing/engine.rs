//! Unit price computation.
//!
//! Pure functions over catalog data; no I/O and no error conditions. Every
//! order and cart line price in the system comes through [`unit_price`] —
//! once frozen into an order item it is never recomputed.

use smallvec::SmallVec;

use crate::domain::{
    pricing::data::{BuyerClass, Selections},
    products::records::{ProductRecord, VariantKind},
};

/// Compute the unit price for `quantity` units of `product`.
///
/// 1. Wholesale buyers get the B2B price when one exists and the quantity
///    meets the product's MOQ; everyone else starts from the base price.
/// 2. The highest bulk tier at or below `quantity` *replaces* that base —
///    tier prices are absolute, not additive.
/// 3. Matched RAM/storage selections add their signed adjustment.
/// 4. A matched warranty selection adds its price; anything unmatched is the
///    default (free) warranty.
///
/// The result saturates at zero.
#[must_use]
pub fn unit_price(
    product: &ProductRecord,
    quantity: u64,
    buyer: BuyerClass,
    selections: &Selections,
) -> u64 {
    let mut base = match (buyer, product.b2b_price) {
        (BuyerClass::B2b, Some(b2b_price)) if quantity >= product.moq => b2b_price,
        _ => product.base_price,
    };

    if let Some(tier_price) = bulk_tier_price(product, quantity) {
        base = tier_price;
    }

    let mut price = i64::try_from(base).unwrap_or(i64::MAX);

    if let Some(ram) = selections.ram.as_deref()
        && let Some(adjustment) = variant_adjustment(product, VariantKind::Ram, ram)
    {
        price = price.saturating_add(adjustment);
    }

    if let Some(storage) = selections.storage.as_deref()
        && let Some(adjustment) = variant_adjustment(product, VariantKind::Storage, storage)
    {
        price = price.saturating_add(adjustment);
    }

    if let Some(warranty) = selections.warranty.as_deref()
        && let Some(warranty_price) = warranty_price(product, warranty)
    {
        price = price.saturating_add(i64::try_from(warranty_price).unwrap_or(i64::MAX));
    }

    u64::try_from(price).unwrap_or(0)
}

/// The price of the highest tier whose `min_qty` is at or below `quantity`.
#[must_use]
pub fn bulk_tier_price(product: &ProductRecord, quantity: u64) -> Option<u64> {
    let mut tiers: SmallVec<[_; 4]> = product.bulk_tiers.iter().copied().collect();

    tiers.sort_unstable_by(|a, b| b.min_qty.cmp(&a.min_qty));

    tiers
        .iter()
        .find(|tier| tier.min_qty <= quantity)
        .map(|tier| tier.price)
}

/// Look up the price adjustment for a selected configuration value.
///
/// Matching is case-insensitive and whitespace-trimmed against the product's
/// catalog-defined variants. `None` means "no such option" and the caller
/// applies no adjustment — the silent-ignore policy is this `Option`, not an
/// accident of control flow.
#[must_use]
pub fn variant_adjustment(
    product: &ProductRecord,
    kind: VariantKind,
    selected: &str,
) -> Option<i64> {
    let selected = selected.trim();

    product
        .variants
        .iter()
        .find(|variant| {
            variant.kind == kind && variant.value.trim().eq_ignore_ascii_case(selected)
        })
        .map(|variant| variant.price_adjustment)
}

/// Look up the price of a selected warranty duration.
///
/// `None` means the selection matches no catalog option and is treated as the
/// default (free) warranty.
#[must_use]
pub fn warranty_price(product: &ProductRecord, selected: &str) -> Option<u64> {
    let selected = selected.trim();

    product
        .warranties
        .iter()
        .find(|warranty| warranty.duration.trim().eq_ignore_ascii_case(selected))
        .map(|warranty| warranty.price)
}
