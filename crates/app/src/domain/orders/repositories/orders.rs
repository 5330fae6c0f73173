//! Orders Repository

use jiff_sqlx::Timestamp as SqlxTimestamp;
use sqlx::{
    FromRow, Postgres, Row, Transaction, postgres::PgRow, query, query_as, query_scalar,
    types::Json,
};

use crate::{
    database::try_get_amount,
    domain::{
        buyers::records::BuyerUuid,
        orders::records::{
            DeliveryDetails, OrderRecord, OrderStatus, OrderType, OrderUuid, PaymentMethod,
            PaymentStatus,
        },
    },
};

const CREATE_ORDER_SQL: &str = include_str!("../sql/create_order.sql");
const GET_ORDER_SQL: &str = include_str!("../sql/get_order.sql");
const LOCK_ORDER_SQL: &str = include_str!("../sql/lock_order.sql");
const LIST_ORDERS_BY_BUYER_SQL: &str = include_str!("../sql/list_orders_by_buyer.sql");
const UPDATE_ORDER_STATUS_SQL: &str = include_str!("../sql/update_order_status.sql");
const SET_PAYMENT_STATE_SQL: &str = include_str!("../sql/set_payment_state.sql");
const SET_INVOICE_NUMBER_SQL: &str = include_str!("../sql/set_invoice_number.sql");
const DISPLAY_ID_EXISTS_SQL: &str = include_str!("../sql/display_id_exists.sql");

#[derive(Debug, Clone, Default)]
pub(crate) struct PgOrdersRepository;

impl PgOrdersRepository {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn create_order(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        uuid: OrderUuid,
        buyer: BuyerUuid,
        display_id: &str,
        order_type: OrderType,
        status: OrderStatus,
        payment_status: PaymentStatus,
        payment_method: PaymentMethod,
        total_amount: u64,
        delivery: &DeliveryDetails,
    ) -> Result<OrderRecord, sqlx::Error> {
        query_as::<Postgres, OrderRecord>(CREATE_ORDER_SQL)
            .bind(uuid.into_uuid())
            .bind(buyer.into_uuid())
            .bind(display_id)
            .bind(order_type.as_str())
            .bind(status.as_str())
            .bind(payment_status.as_str())
            .bind(payment_method.as_str())
            .bind(i64::try_from(total_amount).unwrap_or(i64::MAX))
            .bind(Json(delivery))
            .fetch_one(&mut **tx)
            .await
    }

    pub(crate) async fn get_order(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderUuid,
    ) -> Result<Option<OrderRecord>, sqlx::Error> {
        query_as::<Postgres, OrderRecord>(GET_ORDER_SQL)
            .bind(order.into_uuid())
            .fetch_optional(&mut **tx)
            .await
    }

    /// Fetch the order under a row lock held for the rest of the transaction.
    ///
    /// Every state-changing path goes through here first, so checking the
    /// current status and acting on it is race-free.
    pub(crate) async fn lock_order(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderUuid,
    ) -> Result<Option<OrderRecord>, sqlx::Error> {
        query_as::<Postgres, OrderRecord>(LOCK_ORDER_SQL)
            .bind(order.into_uuid())
            .fetch_optional(&mut **tx)
            .await
    }

    pub(crate) async fn list_orders_by_buyer(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        buyer: BuyerUuid,
    ) -> Result<Vec<OrderRecord>, sqlx::Error> {
        query_as::<Postgres, OrderRecord>(LIST_ORDERS_BY_BUYER_SQL)
            .bind(buyer.into_uuid())
            .fetch_all(&mut **tx)
            .await
    }

    pub(crate) async fn update_status(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderUuid,
        status: OrderStatus,
    ) -> Result<OrderRecord, sqlx::Error> {
        query_as::<Postgres, OrderRecord>(UPDATE_ORDER_STATUS_SQL)
            .bind(order.into_uuid())
            .bind(status.as_str())
            .fetch_one(&mut **tx)
            .await
    }

    /// Update fulfilment and payment status as one statement, so a reader can
    /// never observe one without the other.
    pub(crate) async fn set_payment_state(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderUuid,
        status: OrderStatus,
        payment_status: PaymentStatus,
    ) -> Result<OrderRecord, sqlx::Error> {
        query_as::<Postgres, OrderRecord>(SET_PAYMENT_STATE_SQL)
            .bind(order.into_uuid())
            .bind(status.as_str())
            .bind(payment_status.as_str())
            .fetch_one(&mut **tx)
            .await
    }

    /// Assign the invoice number if none is set yet; the stored value wins on
    /// a repeat call.
    pub(crate) async fn set_invoice_number(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderUuid,
        invoice_number: &str,
    ) -> Result<Option<String>, sqlx::Error> {
        query_scalar(SET_INVOICE_NUMBER_SQL)
            .bind(order.into_uuid())
            .bind(invoice_number)
            .fetch_one(&mut **tx)
            .await
    }

    pub(crate) async fn display_id_exists(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        display_id: &str,
    ) -> Result<bool, sqlx::Error> {
        query_scalar(DISPLAY_ID_EXISTS_SQL)
            .bind(display_id)
            .fetch_one(&mut **tx)
            .await
    }
}

fn decode_status<T>(
    row: &PgRow,
    col: &'static str,
    from_db: impl Fn(&str) -> Option<T>,
) -> sqlx::Result<T> {
    let raw: String = row.try_get(col)?;

    from_db(&raw).ok_or_else(|| sqlx::Error::ColumnDecode {
        index: col.to_string(),
        source: format!("unknown {col} value: {raw}").into(),
    })
}

impl<'r> FromRow<'r, PgRow> for OrderRecord {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        Ok(Self {
            uuid: OrderUuid::from_uuid(row.try_get("uuid")?),
            buyer_uuid: BuyerUuid::from_uuid(row.try_get("buyer_uuid")?),
            display_id: row.try_get("display_id")?,
            invoice_number: row.try_get("invoice_number")?,
            order_type: decode_status(row, "order_type", OrderType::from_db)?,
            status: decode_status(row, "status", OrderStatus::from_db)?,
            payment_status: decode_status(row, "payment_status", PaymentStatus::from_db)?,
            payment_method: decode_status(row, "payment_method", PaymentMethod::from_db)?,
            total_amount: try_get_amount(row, "total_amount")?,
            delivery: row.try_get::<Json<DeliveryDetails>, _>("delivery")?.0,
            items: Vec::new(),
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
            updated_at: row.try_get::<SqlxTimestamp, _>("updated_at")?.to_jiff(),
        })
    }
}
