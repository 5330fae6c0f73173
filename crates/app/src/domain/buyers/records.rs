//! Buyer Records

use jiff::Timestamp;

use crate::{domain::pricing::data::BuyerClass, uuids::TypedUuid};

/// Buyer UUID
pub type BuyerUuid = TypedUuid<BuyerRecord>;

/// Buyer Role
///
/// The role is the only input to order-type derivation; a client-supplied
/// order type is never trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuyerRole {
    Retail,
    Wholesale,
}

impl BuyerRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Retail => "retail",
            Self::Wholesale => "wholesale",
        }
    }

    #[must_use]
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "retail" => Some(Self::Retail),
            "wholesale" => Some(Self::Wholesale),
            _ => None,
        }
    }

    /// Pricing class this role maps to.
    #[must_use]
    pub fn class(self) -> BuyerClass {
        match self {
            Self::Retail => BuyerClass::B2c,
            Self::Wholesale => BuyerClass::B2b,
        }
    }
}

/// Buyer Record
#[derive(Debug, Clone)]
pub struct BuyerRecord {
    pub uuid: BuyerUuid,
    pub name: String,
    pub role: BuyerRole,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
}
