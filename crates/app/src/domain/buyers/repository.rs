//! Buyers Repository

use jiff_sqlx::Timestamp as SqlxTimestamp;
use sqlx::{FromRow, Postgres, Row, Transaction, postgres::PgRow, query_as};

use crate::domain::buyers::{
    data::NewBuyer,
    records::{BuyerRecord, BuyerRole, BuyerUuid},
};

const CREATE_BUYER_SQL: &str = include_str!("sql/create_buyer.sql");
const GET_BUYER_SQL: &str = include_str!("sql/get_buyer.sql");

#[derive(Debug, Clone, Default)]
pub(crate) struct PgBuyersRepository;

impl PgBuyersRepository {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self
    }

    pub(crate) async fn create_buyer(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        buyer: NewBuyer,
    ) -> Result<BuyerRecord, sqlx::Error> {
        query_as::<Postgres, BuyerRecord>(CREATE_BUYER_SQL)
            .bind(buyer.uuid.into_uuid())
            .bind(buyer.name)
            .bind(buyer.role.as_str())
            .fetch_one(&mut **tx)
            .await
    }

    pub(crate) async fn get_buyer(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        buyer: BuyerUuid,
    ) -> Result<BuyerRecord, sqlx::Error> {
        query_as::<Postgres, BuyerRecord>(GET_BUYER_SQL)
            .bind(buyer.into_uuid())
            .fetch_one(&mut **tx)
            .await
    }
}

impl<'r> FromRow<'r, PgRow> for BuyerRecord {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let role_raw: String = row.try_get("role")?;

        let role = BuyerRole::from_db(&role_raw).ok_or_else(|| sqlx::Error::ColumnDecode {
            index: "role".to_string(),
            source: format!("unknown buyer role: {role_raw}").into(),
        })?;

        Ok(Self {
            uuid: BuyerUuid::from_uuid(row.try_get("uuid")?),
            name: row.try_get("name")?,
            role,
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
            updated_at: row.try_get::<SqlxTimestamp, _>("updated_at")?.to_jiff(),
            deleted_at: row
                .try_get::<Option<SqlxTimestamp>, _>("deleted_at")?
                .map(SqlxTimestamp::to_jiff),
        })
    }
}
