//! Souk Domain Concerns

pub mod buyers;
pub mod carts;
pub mod notifications;
pub mod orders;
pub mod payments;
pub mod pricing;
pub mod products;
pub mod stock;
pub mod tenants;
