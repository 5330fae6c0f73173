//! Products Repository

use jiff_sqlx::Timestamp as SqlxTimestamp;
use sqlx::{FromRow, Postgres, Row, Transaction, postgres::PgRow, query, query_as};
use uuid::Uuid;

use crate::{
    database::try_get_amount,
    domain::products::{
        data::{NewProduct, ProductUpdate},
        records::{BulkTier, ConfigVariant, ProductRecord, ProductUuid, VariantKind, WarrantyOption},
    },
};

const CREATE_PRODUCT_SQL: &str = include_str!("sql/create_product.sql");
const GET_PRODUCT_SQL: &str = include_str!("sql/get_product.sql");
const LIST_PRODUCTS_SQL: &str = include_str!("sql/list_products.sql");
const UPDATE_PRODUCT_SQL: &str = include_str!("sql/update_product.sql");
const DELETE_PRODUCT_SQL: &str = include_str!("sql/delete_product.sql");
const CREATE_BULK_TIER_SQL: &str = include_str!("sql/create_bulk_tier.sql");
const CREATE_VARIANT_SQL: &str = include_str!("sql/create_variant.sql");
const CREATE_WARRANTY_SQL: &str = include_str!("sql/create_warranty.sql");
const GET_BULK_TIERS_SQL: &str = include_str!("sql/get_bulk_tiers.sql");
const GET_VARIANTS_SQL: &str = include_str!("sql/get_variants.sql");
const GET_WARRANTIES_SQL: &str = include_str!("sql/get_warranties.sql");

#[derive(Debug, Clone, Default)]
pub(crate) struct PgProductsRepository;

impl PgProductsRepository {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self
    }

    pub(crate) async fn create_product(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        product: NewProduct,
    ) -> Result<ProductRecord, sqlx::Error> {
        let mut record = query_as::<Postgres, ProductRecord>(CREATE_PRODUCT_SQL)
            .bind(product.uuid.into_uuid())
            .bind(&product.name)
            .bind(i64::try_from(product.base_price).unwrap_or(i64::MAX))
            .bind(product.b2b_price.map(|p| i64::try_from(p).unwrap_or(i64::MAX)))
            .bind(i64::try_from(product.moq).unwrap_or(i64::MAX))
            .bind(i64::try_from(product.stock).unwrap_or(i64::MAX))
            .bind(product.is_active)
            .fetch_one(&mut **tx)
            .await?;

        for tier in &product.bulk_tiers {
            query(CREATE_BULK_TIER_SQL)
                .bind(Uuid::now_v7())
                .bind(product.uuid.into_uuid())
                .bind(i64::try_from(tier.min_qty).unwrap_or(i64::MAX))
                .bind(i64::try_from(tier.price).unwrap_or(i64::MAX))
                .execute(&mut **tx)
                .await?;
        }

        for variant in &product.variants {
            query(CREATE_VARIANT_SQL)
                .bind(Uuid::now_v7())
                .bind(product.uuid.into_uuid())
                .bind(variant.kind.as_str())
                .bind(&variant.value)
                .bind(variant.price_adjustment)
                .execute(&mut **tx)
                .await?;
        }

        for warranty in &product.warranties {
            query(CREATE_WARRANTY_SQL)
                .bind(Uuid::now_v7())
                .bind(product.uuid.into_uuid())
                .bind(&warranty.duration)
                .bind(i64::try_from(warranty.price).unwrap_or(i64::MAX))
                .execute(&mut **tx)
                .await?;
        }

        record.bulk_tiers = product.bulk_tiers;
        record.variants = product.variants;
        record.warranties = product.warranties;

        Ok(record)
    }

    pub(crate) async fn get_product(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        product: ProductUuid,
    ) -> Result<ProductRecord, sqlx::Error> {
        let record = query_as::<Postgres, ProductRecord>(GET_PRODUCT_SQL)
            .bind(product.into_uuid())
            .fetch_one(&mut **tx)
            .await?;

        self.load_children(tx, record).await
    }

    /// Like [`Self::get_product`], but `None` instead of `RowNotFound` —
    /// callers that revalidate cart lines need to distinguish "gone" from a
    /// storage failure.
    pub(crate) async fn find_product(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        product: ProductUuid,
    ) -> Result<Option<ProductRecord>, sqlx::Error> {
        let record = query_as::<Postgres, ProductRecord>(GET_PRODUCT_SQL)
            .bind(product.into_uuid())
            .fetch_optional(&mut **tx)
            .await?;

        match record {
            Some(record) => Ok(Some(self.load_children(tx, record).await?)),
            None => Ok(None),
        }
    }

    pub(crate) async fn list_products(
        &self,
        tx: &mut Transaction<'_, Postgres>,
    ) -> Result<Vec<ProductRecord>, sqlx::Error> {
        let records = query_as::<Postgres, ProductRecord>(LIST_PRODUCTS_SQL)
            .fetch_all(&mut **tx)
            .await?;

        let mut products = Vec::with_capacity(records.len());

        for record in records {
            products.push(self.load_children(tx, record).await?);
        }

        Ok(products)
    }

    pub(crate) async fn update_product(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        product: ProductUuid,
        update: ProductUpdate,
    ) -> Result<ProductRecord, sqlx::Error> {
        let record = query_as::<Postgres, ProductRecord>(UPDATE_PRODUCT_SQL)
            .bind(product.into_uuid())
            .bind(&update.name)
            .bind(i64::try_from(update.base_price).unwrap_or(i64::MAX))
            .bind(update.b2b_price.map(|p| i64::try_from(p).unwrap_or(i64::MAX)))
            .bind(i64::try_from(update.moq).unwrap_or(i64::MAX))
            .bind(update.is_active)
            .fetch_one(&mut **tx)
            .await?;

        self.load_children(tx, record).await
    }

    pub(crate) async fn delete_product(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        product: ProductUuid,
    ) -> Result<u64, sqlx::Error> {
        let rows_affected = query(DELETE_PRODUCT_SQL)
            .bind(product.into_uuid())
            .execute(&mut **tx)
            .await?
            .rows_affected();

        Ok(rows_affected)
    }

    async fn load_children(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        mut record: ProductRecord,
    ) -> Result<ProductRecord, sqlx::Error> {
        let tier_rows = query(GET_BULK_TIERS_SQL)
            .bind(record.uuid.into_uuid())
            .fetch_all(&mut **tx)
            .await?;

        record.bulk_tiers = tier_rows
            .iter()
            .map(|row| {
                Ok(BulkTier {
                    min_qty: try_get_amount(row, "min_qty")?,
                    price: try_get_amount(row, "price")?,
                })
            })
            .collect::<Result<_, sqlx::Error>>()?;

        let variant_rows = query(GET_VARIANTS_SQL)
            .bind(record.uuid.into_uuid())
            .fetch_all(&mut **tx)
            .await?;

        record.variants = variant_rows
            .iter()
            .map(|row| {
                let kind_raw: String = row.try_get("kind")?;

                let kind =
                    VariantKind::from_db(&kind_raw).ok_or_else(|| sqlx::Error::ColumnDecode {
                        index: "kind".to_string(),
                        source: format!("unknown variant kind: {kind_raw}").into(),
                    })?;

                Ok(ConfigVariant {
                    kind,
                    value: row.try_get("value")?,
                    price_adjustment: row.try_get("price_adjustment")?,
                })
            })
            .collect::<Result<_, sqlx::Error>>()?;

        let warranty_rows = query(GET_WARRANTIES_SQL)
            .bind(record.uuid.into_uuid())
            .fetch_all(&mut **tx)
            .await?;

        record.warranties = warranty_rows
            .iter()
            .map(|row| {
                Ok(WarrantyOption {
                    duration: row.try_get("duration")?,
                    price: try_get_amount(row, "price")?,
                })
            })
            .collect::<Result<_, sqlx::Error>>()?;

        Ok(record)
    }
}

impl<'r> FromRow<'r, PgRow> for ProductRecord {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let b2b_price = row
            .try_get::<Option<i64>, _>("b2b_price")?
            .map(|p| {
                u64::try_from(p).map_err(|e| sqlx::Error::ColumnDecode {
                    index: "b2b_price".to_string(),
                    source: Box::new(e),
                })
            })
            .transpose()?;

        Ok(Self {
            uuid: ProductUuid::from_uuid(row.try_get("uuid")?),
            name: row.try_get("name")?,
            base_price: try_get_amount(row, "base_price")?,
            b2b_price,
            moq: try_get_amount(row, "moq")?,
            stock: try_get_amount(row, "stock")?,
            is_active: row.try_get("is_active")?,
            bulk_tiers: Vec::new(),
            variants: Vec::new(),
            warranties: Vec::new(),
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
            updated_at: row.try_get::<SqlxTimestamp, _>("updated_at")?.to_jiff(),
            deleted_at: row
                .try_get::<Option<SqlxTimestamp>, _>("deleted_at")?
                .map(SqlxTimestamp::to_jiff),
        })
    }
}
