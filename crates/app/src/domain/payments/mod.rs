//! Payments

pub mod errors;
pub mod gateway;
pub mod records;
pub(crate) mod repository;
pub mod service;

pub use errors::PaymentsServiceError;
pub use service::*;
