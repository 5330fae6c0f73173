//! Buyers service.

use async_trait::async_trait;
use mockall::automock;

use crate::{
    database::Db,
    domain::{
        buyers::{
            data::NewBuyer,
            errors::BuyersServiceError,
            records::{BuyerRecord, BuyerUuid},
            repository::PgBuyersRepository,
        },
        tenants::records::TenantUuid,
    },
};

#[derive(Debug, Clone)]
pub struct PgBuyersService {
    db: Db,
    repository: PgBuyersRepository,
}

impl PgBuyersService {
    #[must_use]
    pub fn new(db: Db) -> Self {
        Self {
            db,
            repository: PgBuyersRepository::new(),
        }
    }
}

#[async_trait]
impl BuyersService for PgBuyersService {
    async fn create_buyer(
        &self,
        tenant: TenantUuid,
        buyer: NewBuyer,
    ) -> Result<BuyerRecord, BuyersServiceError> {
        let mut tx = self.db.begin_tenant_transaction(tenant).await?;

        let created = self.repository.create_buyer(&mut tx, buyer).await?;

        tx.commit().await?;

        Ok(created)
    }

    async fn get_buyer(
        &self,
        tenant: TenantUuid,
        buyer: BuyerUuid,
    ) -> Result<BuyerRecord, BuyersServiceError> {
        let mut tx = self.db.begin_tenant_transaction(tenant).await?;

        let buyer = self.repository.get_buyer(&mut tx, buyer).await?;

        tx.commit().await?;

        Ok(buyer)
    }
}

#[automock]
#[async_trait]
pub trait BuyersService: Send + Sync {
    /// Creates a new buyer in the given tenant.
    async fn create_buyer(
        &self,
        tenant: TenantUuid,
        buyer: NewBuyer,
    ) -> Result<BuyerRecord, BuyersServiceError>;

    /// Retrieve a single buyer.
    async fn get_buyer(
        &self,
        tenant: TenantUuid,
        buyer: BuyerUuid,
    ) -> Result<BuyerRecord, BuyersServiceError>;
}
