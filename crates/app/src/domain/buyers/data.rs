//! Buyer Data

use crate::domain::buyers::records::{BuyerRole, BuyerUuid};

/// New Buyer Data
#[derive(Debug, Clone, PartialEq)]
pub struct NewBuyer {
    pub uuid: BuyerUuid,
    pub name: String,
    pub role: BuyerRole,
}
