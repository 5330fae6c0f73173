//! Carts Repository

use jiff_sqlx::Timestamp as SqlxTimestamp;
use sqlx::{FromRow, Postgres, Row, Transaction, postgres::PgRow, query, query_as};

use crate::{
    database::try_get_amount,
    domain::{
        buyers::records::BuyerUuid,
        carts::records::{CartRecord, CartUuid},
    },
};

const FIND_CART_BY_BUYER_SQL: &str = include_str!("../sql/find_cart_by_buyer.sql");
const CREATE_CART_SQL: &str = include_str!("../sql/create_cart.sql");
const SET_CART_TOTAL_SQL: &str = include_str!("../sql/set_cart_total.sql");
const LIST_ABANDONED_CARTS_SQL: &str = include_str!("../sql/list_abandoned_carts.sql");

#[derive(Debug, Clone, Default)]
pub(crate) struct PgCartsRepository;

impl PgCartsRepository {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self
    }

    pub(crate) async fn find_cart_by_buyer(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        buyer: BuyerUuid,
    ) -> Result<Option<CartRecord>, sqlx::Error> {
        query_as::<Postgres, CartRecord>(FIND_CART_BY_BUYER_SQL)
            .bind(buyer.into_uuid())
            .fetch_optional(&mut **tx)
            .await
    }

    pub(crate) async fn create_cart(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cart: CartUuid,
        buyer: BuyerUuid,
    ) -> Result<CartRecord, sqlx::Error> {
        query_as::<Postgres, CartRecord>(CREATE_CART_SQL)
            .bind(cart.into_uuid())
            .bind(buyer.into_uuid())
            .fetch_one(&mut **tx)
            .await
    }

    pub(crate) async fn set_cart_total(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cart: CartUuid,
        total: u64,
    ) -> Result<(), sqlx::Error> {
        query(SET_CART_TOTAL_SQL)
            .bind(cart.into_uuid())
            .bind(i64::try_from(total).unwrap_or(i64::MAX))
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    /// Carts untouched since `cutoff` that still hold items.
    pub(crate) async fn list_abandoned_carts(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cutoff: jiff::Timestamp,
    ) -> Result<Vec<CartRecord>, sqlx::Error> {
        query_as::<Postgres, CartRecord>(LIST_ABANDONED_CARTS_SQL)
            .bind(SqlxTimestamp::from(cutoff))
            .fetch_all(&mut **tx)
            .await
    }
}

impl<'r> FromRow<'r, PgRow> for CartRecord {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        Ok(Self {
            uuid: CartUuid::from_uuid(row.try_get("uuid")?),
            buyer_uuid: BuyerUuid::from_uuid(row.try_get("buyer_uuid")?),
            total_amount: try_get_amount(row, "total_amount")?,
            items: Vec::new(),
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
            updated_at: row.try_get::<SqlxTimestamp, _>("updated_at")?.to_jiff(),
        })
    }
}
