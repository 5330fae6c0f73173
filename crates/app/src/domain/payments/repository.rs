//! Transactions Repository

use jiff_sqlx::Timestamp as SqlxTimestamp;
use sqlx::{FromRow, Postgres, Row, Transaction, postgres::PgRow, query_as};

use crate::{
    database::try_get_amount,
    domain::{
        buyers::records::BuyerUuid,
        orders::records::OrderUuid,
        payments::records::{TransactionRecord, TransactionStatus, TransactionUuid},
    },
};

const UPSERT_TRANSACTION_SQL: &str = include_str!("sql/upsert_transaction.sql");
const FIND_TRANSACTION_BY_GATEWAY_ID_SQL: &str =
    include_str!("sql/find_transaction_by_gateway_id.sql");
const LIST_TRANSACTIONS_BY_ORDER_SQL: &str = include_str!("sql/list_transactions_by_order.sql");

#[derive(Debug, Clone, Default)]
pub(crate) struct PgTransactionsRepository;

impl PgTransactionsRepository {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self
    }

    /// Record the transaction for a gateway payment id, updating the
    /// existing row in place when one exists. At most one financial record
    /// per gateway payment, enforced by the unique index.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn upsert_transaction(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderUuid,
        buyer: BuyerUuid,
        gateway_payment_id: &str,
        amount: u64,
        status: TransactionStatus,
        metadata: &serde_json::Value,
    ) -> Result<TransactionRecord, sqlx::Error> {
        query_as::<Postgres, TransactionRecord>(UPSERT_TRANSACTION_SQL)
            .bind(TransactionUuid::new().into_uuid())
            .bind(order.into_uuid())
            .bind(buyer.into_uuid())
            .bind(gateway_payment_id)
            .bind(i64::try_from(amount).unwrap_or(i64::MAX))
            .bind(status.as_str())
            .bind(metadata)
            .fetch_one(&mut **tx)
            .await
    }

    pub(crate) async fn find_by_gateway_payment_id(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        gateway_payment_id: &str,
    ) -> Result<Option<TransactionRecord>, sqlx::Error> {
        query_as::<Postgres, TransactionRecord>(FIND_TRANSACTION_BY_GATEWAY_ID_SQL)
            .bind(gateway_payment_id)
            .fetch_optional(&mut **tx)
            .await
    }

    pub(crate) async fn list_by_order(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderUuid,
    ) -> Result<Vec<TransactionRecord>, sqlx::Error> {
        query_as::<Postgres, TransactionRecord>(LIST_TRANSACTIONS_BY_ORDER_SQL)
            .bind(order.into_uuid())
            .fetch_all(&mut **tx)
            .await
    }
}

impl<'r> FromRow<'r, PgRow> for TransactionRecord {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let status_raw: String = row.try_get("status")?;

        let status =
            TransactionStatus::from_db(&status_raw).ok_or_else(|| sqlx::Error::ColumnDecode {
                index: "status".to_string(),
                source: format!("unknown transaction status: {status_raw}").into(),
            })?;

        Ok(Self {
            uuid: TransactionUuid::from_uuid(row.try_get("uuid")?),
            order_uuid: OrderUuid::from_uuid(row.try_get("order_uuid")?),
            buyer_uuid: BuyerUuid::from_uuid(row.try_get("buyer_uuid")?),
            gateway_payment_id: row.try_get("gateway_payment_id")?,
            amount: try_get_amount(row, "amount")?,
            status,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
            updated_at: row.try_get::<SqlxTimestamp, _>("updated_at")?.to_jiff(),
        })
    }
}
