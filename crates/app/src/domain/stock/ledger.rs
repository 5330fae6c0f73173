//! Stock Ledger
//!
//! The single writer for `products.stock`. Order approval, cash-on-delivery
//! checkout, and payment reconciliation all deduct through here; each order's
//! deduction happens at most once, enforced by the caller checking order
//! state under a row lock before calling in.

use sqlx::{Postgres, Transaction, query, query_scalar};

use crate::domain::{products::records::ProductUuid, stock::errors::StockError};

const DEDUCT_STOCK_SQL: &str = include_str!("sql/deduct_stock.sql");
const GET_STOCK_SQL: &str = include_str!("sql/get_stock.sql");

#[derive(Debug, Clone, Default)]
pub struct PgStockLedger;

impl PgStockLedger {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Atomically decrement stock, never below zero.
    ///
    /// The decrement is a single conditional `UPDATE … WHERE stock >= n`, not
    /// a read-then-write pair, so concurrent checkouts for the same product
    /// cannot lose updates.
    ///
    /// # Errors
    ///
    /// [`StockError::InsufficientStock`] with the currently available amount
    /// when the product holds fewer than `quantity` units;
    /// [`StockError::ProductNotFound`] when the product does not exist.
    pub async fn try_deduct(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        product: ProductUuid,
        quantity: u64,
    ) -> Result<(), StockError> {
        let quantity_i64 = i64::try_from(quantity).unwrap_or(i64::MAX);

        let rows_affected = query(DEDUCT_STOCK_SQL)
            .bind(product.into_uuid())
            .bind(quantity_i64)
            .execute(&mut **tx)
            .await?
            .rows_affected();

        if rows_affected == 1 {
            return Ok(());
        }

        match self.get_stock(tx, product).await? {
            Some(available) => Err(StockError::InsufficientStock {
                product,
                available,
                requested: quantity,
            }),
            None => Err(StockError::ProductNotFound(product)),
        }
    }

    /// Current stock for a product, `None` when the product does not exist.
    pub async fn get_stock(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        product: ProductUuid,
    ) -> Result<Option<u64>, StockError> {
        let stock: Option<i64> = query_scalar(GET_STOCK_SQL)
            .bind(product.into_uuid())
            .fetch_optional(&mut **tx)
            .await?;

        Ok(stock.map(|s| u64::try_from(s).unwrap_or(0)))
    }
}
