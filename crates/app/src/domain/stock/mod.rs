//! Stock

pub mod errors;
pub mod ledger;

pub use errors::StockError;
pub use ledger::PgStockLedger;
