//! Carts service.

use async_trait::async_trait;
use mockall::automock;
use sqlx::{Postgres, Transaction};
use tracing::info;

use crate::{
    database::Db,
    domain::{
        buyers::{records::BuyerUuid, repository::PgBuyersRepository},
        carts::{
            data::NewCartItem,
            errors::CartsServiceError,
            records::{CartRecord, CartUuid},
            repositories::{PgCartItemsRepository, PgCartsRepository},
        },
        pricing,
        products::{records::ProductUuid, repository::PgProductsRepository},
        tenants::records::TenantUuid,
    },
};

#[derive(Debug, Clone)]
pub struct PgCartsService {
    db: Db,
    carts: PgCartsRepository,
    items: PgCartItemsRepository,
    buyers: PgBuyersRepository,
    products: PgProductsRepository,
}

impl PgCartsService {
    #[must_use]
    pub fn new(db: Db) -> Self {
        Self {
            db,
            carts: PgCartsRepository::new(),
            items: PgCartItemsRepository::new(),
            buyers: PgBuyersRepository::new(),
            products: PgProductsRepository::new(),
        }
    }

    async fn fetch_buyer(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        buyer: BuyerUuid,
    ) -> Result<crate::domain::buyers::records::BuyerRecord, CartsServiceError> {
        self.buyers.get_buyer(tx, buyer).await.map_err(|error| {
            if matches!(error, sqlx::Error::RowNotFound) {
                CartsServiceError::BuyerNotFound
            } else {
                error.into()
            }
        })
    }

    /// Fetch the buyer's cart, creating it on first access.
    async fn ensure_cart(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        buyer: BuyerUuid,
    ) -> Result<CartRecord, CartsServiceError> {
        match self.carts.find_cart_by_buyer(tx, buyer).await? {
            Some(cart) => Ok(cart),
            None => Ok(self.carts.create_cart(tx, CartUuid::new(), buyer).await?),
        }
    }

    /// Reload the cart's items, recompute its total, and persist it when it
    /// changed. Returns the fully assembled cart.
    async fn refresh_cart(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        mut cart: CartRecord,
    ) -> Result<CartRecord, CartsServiceError> {
        let items = self.items.get_cart_items(tx, cart.uuid).await?;

        let total: u64 = items.iter().map(|item| item.total_price).sum();

        if total != cart.total_amount {
            self.carts.set_cart_total(tx, cart.uuid, total).await?;
            cart.total_amount = total;
        }

        cart.items = items;

        Ok(cart)
    }
}

#[async_trait]
impl CartsService for PgCartsService {
    #[tracing::instrument(
        name = "carts.service.get_cart",
        skip(self),
        fields(tenant_uuid = %tenant, buyer_uuid = %buyer),
        err
    )]
    async fn get_cart(
        &self,
        tenant: TenantUuid,
        buyer: BuyerUuid,
    ) -> Result<CartRecord, CartsServiceError> {
        let mut tx = self.db.begin_tenant_transaction(tenant).await?;

        let buyer_record = self.fetch_buyer(&mut tx, buyer).await?;
        let mut cart = self.ensure_cart(&mut tx, buyer).await?;

        let items = self.items.get_cart_items(&mut tx, cart.uuid).await?;

        // The cart always reflects the current catalog until checkout
        // freezes prices: drop dead lines and reprice live ones on the way
        // through, persisting so the next read is cheap.
        let mut kept = Vec::with_capacity(items.len());
        let mut changed = false;

        for mut item in items {
            let Some(product) = self.products.find_product(&mut tx, item.product_uuid).await?
            else {
                self.items
                    .delete_cart_item(&mut tx, cart.uuid, item.product_uuid)
                    .await?;
                changed = true;
                continue;
            };

            if !product.is_active {
                self.items
                    .delete_cart_item(&mut tx, cart.uuid, item.product_uuid)
                    .await?;
                changed = true;
                continue;
            }

            let unit_price = pricing::unit_price(
                &product,
                item.quantity,
                buyer_record.role.class(),
                &item.selections,
            );
            let total_price = unit_price.saturating_mul(item.quantity);

            if unit_price != item.unit_price || total_price != item.total_price {
                self.items
                    .reprice_cart_item(&mut tx, item.uuid, unit_price, total_price)
                    .await?;

                item.unit_price = unit_price;
                item.total_price = total_price;
                changed = true;
            }

            kept.push(item);
        }

        let total: u64 = kept.iter().map(|item| item.total_price).sum();

        if changed || total != cart.total_amount {
            self.carts.set_cart_total(&mut tx, cart.uuid, total).await?;
            cart.total_amount = total;
        }

        tx.commit().await?;

        cart.items = kept;

        Ok(cart)
    }

    #[tracing::instrument(
        name = "carts.service.add_item",
        skip(self, item),
        fields(
            tenant_uuid = %tenant,
            buyer_uuid = %buyer,
            product_uuid = %item.product_uuid,
            quantity = item.quantity
        ),
        err
    )]
    async fn add_item(
        &self,
        tenant: TenantUuid,
        buyer: BuyerUuid,
        item: NewCartItem,
    ) -> Result<CartRecord, CartsServiceError> {
        if item.quantity == 0 {
            return Err(CartsServiceError::InvalidQuantity);
        }

        let mut tx = self.db.begin_tenant_transaction(tenant).await?;

        let buyer_record = self.fetch_buyer(&mut tx, buyer).await?;
        let cart = self.ensure_cart(&mut tx, buyer).await?;

        let product = self
            .products
            .find_product(&mut tx, item.product_uuid)
            .await?
            .ok_or(CartsServiceError::ProductNotFound)?;

        if !product.is_active {
            return Err(CartsServiceError::ProductInactive);
        }

        let existing = self
            .items
            .find_cart_item(&mut tx, cart.uuid, item.product_uuid)
            .await?;

        let merged_quantity = existing
            .map(|line| line.quantity)
            .unwrap_or(0)
            .saturating_add(item.quantity);

        if product.stock < merged_quantity {
            return Err(CartsServiceError::InsufficientStock {
                product: product.uuid,
                available: product.stock,
                requested: merged_quantity,
            });
        }

        let unit_price = pricing::unit_price(
            &product,
            merged_quantity,
            buyer_record.role.class(),
            &item.selections,
        );

        self.items
            .upsert_cart_item(
                &mut tx,
                cart.uuid,
                item.product_uuid,
                merged_quantity,
                unit_price,
                unit_price.saturating_mul(merged_quantity),
                &item.selections,
            )
            .await?;

        let cart = self.refresh_cart(&mut tx, cart).await?;

        tx.commit().await?;

        info!(cart_uuid = %cart.uuid, "added cart item");

        Ok(cart)
    }

    #[tracing::instrument(
        name = "carts.service.update_item",
        skip(self),
        fields(
            tenant_uuid = %tenant,
            buyer_uuid = %buyer,
            product_uuid = %product,
            quantity
        ),
        err
    )]
    async fn update_item(
        &self,
        tenant: TenantUuid,
        buyer: BuyerUuid,
        product: ProductUuid,
        quantity: u64,
    ) -> Result<CartRecord, CartsServiceError> {
        if quantity == 0 {
            return Err(CartsServiceError::InvalidQuantity);
        }

        let mut tx = self.db.begin_tenant_transaction(tenant).await?;

        let buyer_record = self.fetch_buyer(&mut tx, buyer).await?;
        let cart = self.ensure_cart(&mut tx, buyer).await?;

        let line = self
            .items
            .find_cart_item(&mut tx, cart.uuid, product)
            .await?
            .ok_or(CartsServiceError::ItemNotFound)?;

        let product_record = self
            .products
            .find_product(&mut tx, product)
            .await?
            .ok_or(CartsServiceError::ProductNotFound)?;

        if !product_record.is_active {
            return Err(CartsServiceError::ProductInactive);
        }

        // An update replaces the quantity outright, so the stock check is
        // against the new quantity, not additive.
        if product_record.stock < quantity {
            return Err(CartsServiceError::InsufficientStock {
                product,
                available: product_record.stock,
                requested: quantity,
            });
        }

        let unit_price = pricing::unit_price(
            &product_record,
            quantity,
            buyer_record.role.class(),
            &line.selections,
        );

        self.items
            .update_cart_item(
                &mut tx,
                cart.uuid,
                product,
                quantity,
                unit_price,
                unit_price.saturating_mul(quantity),
            )
            .await?
            .ok_or(CartsServiceError::ItemNotFound)?;

        let cart = self.refresh_cart(&mut tx, cart).await?;

        tx.commit().await?;

        Ok(cart)
    }

    #[tracing::instrument(
        name = "carts.service.remove_item",
        skip(self),
        fields(tenant_uuid = %tenant, buyer_uuid = %buyer, product_uuid = %product),
        err
    )]
    async fn remove_item(
        &self,
        tenant: TenantUuid,
        buyer: BuyerUuid,
        product: ProductUuid,
    ) -> Result<CartRecord, CartsServiceError> {
        let mut tx = self.db.begin_tenant_transaction(tenant).await?;

        self.fetch_buyer(&mut tx, buyer).await?;
        let cart = self.ensure_cart(&mut tx, buyer).await?;

        let rows_affected = self
            .items
            .delete_cart_item(&mut tx, cart.uuid, product)
            .await?;

        if rows_affected == 0 {
            return Err(CartsServiceError::ItemNotFound);
        }

        let cart = self.refresh_cart(&mut tx, cart).await?;

        tx.commit().await?;

        Ok(cart)
    }

    #[tracing::instrument(
        name = "carts.service.clear_cart",
        skip(self),
        fields(tenant_uuid = %tenant, buyer_uuid = %buyer),
        err
    )]
    async fn clear_cart(&self, tenant: TenantUuid, buyer: BuyerUuid) -> Result<(), CartsServiceError> {
        let mut tx = self.db.begin_tenant_transaction(tenant).await?;

        self.fetch_buyer(&mut tx, buyer).await?;
        let cart = self.ensure_cart(&mut tx, buyer).await?;

        self.items.clear_cart_items(&mut tx, cart.uuid).await?;
        self.carts.set_cart_total(&mut tx, cart.uuid, 0).await?;

        tx.commit().await?;

        Ok(())
    }
}

#[automock]
#[async_trait]
pub trait CartsService: Send + Sync {
    /// Retrieve the buyer's cart, creating it lazily on first access.
    ///
    /// Every read revalidates and reprices each line against the current
    /// catalog, so the returned cart never shows a stale price or a dead
    /// product.
    async fn get_cart(
        &self,
        tenant: TenantUuid,
        buyer: BuyerUuid,
    ) -> Result<CartRecord, CartsServiceError>;

    /// Add an item to the buyer's cart, merging with an existing line for
    /// the same product.
    async fn add_item(
        &self,
        tenant: TenantUuid,
        buyer: BuyerUuid,
        item: NewCartItem,
    ) -> Result<CartRecord, CartsServiceError>;

    /// Replace the quantity of an existing line.
    async fn update_item(
        &self,
        tenant: TenantUuid,
        buyer: BuyerUuid,
        product: ProductUuid,
        quantity: u64,
    ) -> Result<CartRecord, CartsServiceError>;

    /// Remove a line from the cart.
    async fn remove_item(
        &self,
        tenant: TenantUuid,
        buyer: BuyerUuid,
        product: ProductUuid,
    ) -> Result<CartRecord, CartsServiceError>;

    /// Remove every line. The cart itself survives.
    async fn clear_cart(&self, tenant: TenantUuid, buyer: BuyerUuid)
    -> Result<(), CartsServiceError>;
}
