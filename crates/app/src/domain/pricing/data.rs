//! Pricing Data

/// Buyer Class Data
///
/// Derived from the buyer's role at the time of pricing; never supplied by
/// the client.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum BuyerClass {
    #[default]
    B2c,
    B2b,
}

/// Selected configuration and warranty for one line.
///
/// Values are matched against the product's catalog-defined options
/// case-insensitively and trimmed. A selection with no matching option
/// contributes nothing — see [`super::variant_adjustment`] and
/// [`super::warranty_price`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Selections {
    pub ram: Option<String>,
    pub storage: Option<String>,
    pub warranty: Option<String>,
}

impl Selections {
    /// No configuration, no warranty.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }
}
