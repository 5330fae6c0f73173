//! Orders service.
//!
//! Owns the order state machine: checkout freezes prices into order items,
//! approval and cash-on-delivery creation deduct stock, and every transition
//! is checked under a row lock so the deduction happens at most once per
//! order.

use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;
use rand::{Rng, distributions::Alphanumeric};
use sqlx::{Postgres, Transaction};
use tracing::{Span, info, warn};

use crate::{
    database::Db,
    domain::{
        buyers::{
            records::{BuyerRecord, BuyerRole, BuyerUuid},
            repository::PgBuyersRepository,
        },
        carts::repositories::{PgCartItemsRepository, PgCartsRepository},
        notifications::{Notification, NotificationDispatcher, Severity},
        orders::{
            data::{NewOrder, OrderSource},
            errors::OrdersServiceError,
            records::{OrderRecord, OrderStatus, OrderType, OrderUuid, PaymentMethod, PaymentStatus},
            repositories::{PgOrderItemsRepository, PgOrdersRepository},
        },
        pricing::{self, data::Selections},
        products::{records::ProductUuid, repository::PgProductsRepository},
        stock::ledger::PgStockLedger,
        tenants::records::TenantUuid,
    },
};

/// A validated, priced checkout line.
struct PricedLine {
    product_uuid: ProductUuid,
    quantity: u64,
    unit_price: u64,
    selections: Selections,
}

#[derive(Clone)]
pub struct PgOrdersService {
    db: Db,
    orders: PgOrdersRepository,
    items: PgOrderItemsRepository,
    buyers: PgBuyersRepository,
    products: PgProductsRepository,
    carts: PgCartsRepository,
    cart_items: PgCartItemsRepository,
    ledger: PgStockLedger,
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl PgOrdersService {
    #[must_use]
    pub fn new(db: Db, dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self {
            db,
            orders: PgOrdersRepository::new(),
            items: PgOrderItemsRepository::new(),
            buyers: PgBuyersRepository::new(),
            products: PgProductsRepository::new(),
            carts: PgCartsRepository::new(),
            cart_items: PgCartItemsRepository::new(),
            ledger: PgStockLedger::new(),
            dispatcher,
        }
    }

    async fn fetch_buyer(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        buyer: BuyerUuid,
    ) -> Result<BuyerRecord, OrdersServiceError> {
        self.buyers.get_buyer(tx, buyer).await.map_err(|error| {
            if matches!(error, sqlx::Error::RowNotFound) {
                OrdersServiceError::BuyerNotFound
            } else {
                error.into()
            }
        })
    }

    /// Validate and price every requested line against the live catalog.
    ///
    /// Stock is re-checked here regardless of what the cart said earlier, to
    /// close the race between cart read and checkout.
    async fn price_lines(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        buyer: &BuyerRecord,
        lines: Vec<(ProductUuid, u64, Selections)>,
    ) -> Result<(Vec<PricedLine>, u64), OrdersServiceError> {
        let mut priced = Vec::with_capacity(lines.len());
        let mut total: u64 = 0;

        for (product_uuid, quantity, selections) in lines {
            if quantity == 0 {
                return Err(OrdersServiceError::InvalidData);
            }

            let product = self
                .products
                .find_product(tx, product_uuid)
                .await?
                .ok_or(OrdersServiceError::ProductNotFound(product_uuid))?;

            if !product.is_active {
                return Err(OrdersServiceError::ProductInactive(product_uuid));
            }

            if product.stock < quantity {
                return Err(OrdersServiceError::InsufficientStock {
                    product: product_uuid,
                    available: product.stock,
                    requested: quantity,
                });
            }

            let unit_price =
                pricing::unit_price(&product, quantity, buyer.role.class(), &selections);

            total = total.saturating_add(unit_price.saturating_mul(quantity));

            priced.push(PricedLine {
                product_uuid,
                quantity,
                unit_price,
                selections,
            });
        }

        Ok((priced, total))
    }

    /// Derive a short human-facing id from the order UUID, retrying with a
    /// random suffix until it is unique within the tenant. The unique index
    /// on `display_id` backstops the check.
    async fn generate_display_id(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderUuid,
    ) -> Result<String, OrdersServiceError> {
        let hex = order.into_uuid().simple().to_string();
        let (_, tail) = hex.split_at(24);
        let base = format!("ORD-{}", tail.to_uppercase());

        let mut candidate = base.clone();

        while self.orders.display_id_exists(tx, &candidate).await? {
            let suffix: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(4)
                .map(|c| (c as char).to_ascii_uppercase())
                .collect();

            candidate = format!("{base}-{suffix}");
        }

        Ok(candidate)
    }

    async fn load_items(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        mut order: OrderRecord,
    ) -> Result<OrderRecord, OrdersServiceError> {
        order.items = self.items.get_order_items(tx, order.uuid).await?;

        Ok(order)
    }

    async fn notify_buyer_best_effort(
        &self,
        tenant: TenantUuid,
        buyer: BuyerUuid,
        notification: Notification,
    ) {
        if let Err(error) = self
            .dispatcher
            .notify_buyer(tenant, buyer, notification)
            .await
        {
            warn!(tenant_uuid = %tenant, buyer_uuid = %buyer, %error, "buyer notification failed");
        }
    }

    async fn notify_admins_best_effort(&self, tenant: TenantUuid, notification: Notification) {
        if let Err(error) = self.dispatcher.notify_admins(tenant, notification).await {
            warn!(tenant_uuid = %tenant, %error, "admin notification failed");
        }
    }

    /// Shared transition guard: nothing leaves a terminal state.
    async fn transition_locked(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderRecord,
        to: OrderStatus,
    ) -> Result<OrderRecord, OrdersServiceError> {
        if order.status.is_terminal() {
            return Err(OrdersServiceError::InvalidTransition {
                from: order.status,
                to,
            });
        }

        Ok(self.orders.update_status(tx, order.uuid, to).await?)
    }
}

#[async_trait]
impl OrdersService for PgOrdersService {
    #[tracing::instrument(
        name = "orders.service.create_order",
        skip(self, order),
        fields(
            tenant_uuid = %tenant,
            buyer_uuid = %order.buyer_uuid,
            payment_method = order.payment_method.as_str(),
            order_uuid = tracing::field::Empty,
            display_id = tracing::field::Empty,
        ),
        err
    )]
    async fn create_order(
        &self,
        tenant: TenantUuid,
        order: NewOrder,
    ) -> Result<OrderRecord, OrdersServiceError> {
        let mut tx = self.db.begin_tenant_transaction(tenant).await?;

        let buyer = self.fetch_buyer(&mut tx, order.buyer_uuid).await?;

        // The order type comes from the buyer's role, never from the caller,
        // so a retail buyer cannot claim wholesale pricing rules.
        let order_type = match buyer.role {
            BuyerRole::Wholesale => OrderType::B2b,
            BuyerRole::Retail => OrderType::B2c,
        };

        let source_cart = match &order.source {
            OrderSource::Cart => self.carts.find_cart_by_buyer(&mut tx, buyer.uuid).await?,
            OrderSource::Lines(_) => None,
        };

        let lines: Vec<(ProductUuid, u64, Selections)> = match order.source {
            OrderSource::Cart => {
                let cart = source_cart
                    .as_ref()
                    .ok_or(OrdersServiceError::EmptyOrder)?;

                self.cart_items
                    .get_cart_items(&mut tx, cart.uuid)
                    .await?
                    .into_iter()
                    .map(|item| (item.product_uuid, item.quantity, item.selections))
                    .collect()
            }
            OrderSource::Lines(lines) => lines
                .into_iter()
                .map(|line| (line.product_uuid, line.quantity, line.selections))
                .collect(),
        };

        if lines.is_empty() {
            return Err(OrdersServiceError::EmptyOrder);
        }

        let (priced, total_amount) = self.price_lines(&mut tx, &buyer, lines).await?;

        let order_uuid = OrderUuid::new();
        let display_id = self.generate_display_id(&mut tx, order_uuid).await?;

        // Cash on delivery needs no external confirmation: the order is
        // approved and stock deducted right here. Gateway orders stay
        // pending until reconciliation.
        let status = match order.payment_method {
            PaymentMethod::CashOnDelivery => OrderStatus::Approved,
            PaymentMethod::Gateway => OrderStatus::Pending,
        };

        let mut record = self
            .orders
            .create_order(
                &mut tx,
                order_uuid,
                buyer.uuid,
                &display_id,
                order_type,
                status,
                PaymentStatus::Pending,
                order.payment_method,
                total_amount,
                &order.delivery,
            )
            .await?;

        for line in &priced {
            let item = self
                .items
                .create_order_item(
                    &mut tx,
                    order_uuid,
                    line.product_uuid,
                    line.quantity,
                    line.unit_price,
                    &line.selections,
                )
                .await?;

            record.items.push(item);
        }

        if order.payment_method == PaymentMethod::CashOnDelivery {
            for line in &priced {
                self.ledger
                    .try_deduct(&mut tx, line.product_uuid, line.quantity)
                    .await?;
            }
        }

        if let Some(cart) = source_cart {
            self.cart_items.clear_cart_items(&mut tx, cart.uuid).await?;
            self.carts.set_cart_total(&mut tx, cart.uuid, 0).await?;
        }

        tx.commit().await?;

        Span::current()
            .record("order_uuid", tracing::field::display(order_uuid))
            .record("display_id", display_id.as_str());

        info!(total_amount, "order created");

        self.notify_buyer_best_effort(
            tenant,
            buyer.uuid,
            Notification::info(
                "Order placed",
                format!("Your order {display_id} has been received."),
            )
            .with_deep_link(format!("/orders/{display_id}")),
        )
        .await;

        self.notify_admins_best_effort(
            tenant,
            Notification::info("New order", format!("Order {display_id} was placed."))
                .with_deep_link(format!("/admin/orders/{display_id}")),
        )
        .await;

        Ok(record)
    }

    #[tracing::instrument(
        name = "orders.service.get_order",
        skip(self),
        fields(tenant_uuid = %tenant, order_uuid = %order),
        err
    )]
    async fn get_order(
        &self,
        tenant: TenantUuid,
        order: OrderUuid,
    ) -> Result<OrderRecord, OrdersServiceError> {
        let mut tx = self.db.begin_tenant_transaction(tenant).await?;

        let record = self
            .orders
            .get_order(&mut tx, order)
            .await?
            .ok_or(OrdersServiceError::NotFound)?;

        let record = self.load_items(&mut tx, record).await?;

        tx.commit().await?;

        Ok(record)
    }

    #[tracing::instrument(
        name = "orders.service.list_orders",
        skip(self),
        fields(tenant_uuid = %tenant, buyer_uuid = %buyer),
        err
    )]
    async fn list_orders(
        &self,
        tenant: TenantUuid,
        buyer: BuyerUuid,
    ) -> Result<Vec<OrderRecord>, OrdersServiceError> {
        let mut tx = self.db.begin_tenant_transaction(tenant).await?;

        let records = self.orders.list_orders_by_buyer(&mut tx, buyer).await?;

        let mut orders = Vec::with_capacity(records.len());

        for record in records {
            orders.push(self.load_items(&mut tx, record).await?);
        }

        tx.commit().await?;

        Ok(orders)
    }

    #[tracing::instrument(
        name = "orders.service.approve_order",
        skip(self),
        fields(tenant_uuid = %tenant, order_uuid = %order),
        err
    )]
    async fn approve_order(
        &self,
        tenant: TenantUuid,
        order: OrderUuid,
    ) -> Result<OrderRecord, OrdersServiceError> {
        let mut tx = self.db.begin_tenant_transaction(tenant).await?;

        let record = self
            .orders
            .lock_order(&mut tx, order)
            .await?
            .ok_or(OrdersServiceError::NotFound)?;

        // Approval is only legal from PENDING. This is also what makes the
        // stock deduction at-most-once: a second approval (or one after COD
        // creation already approved the order) never reaches the ledger.
        if record.status != OrderStatus::Pending {
            return Err(OrdersServiceError::InvalidTransition {
                from: record.status,
                to: OrderStatus::Approved,
            });
        }

        let items = self.items.get_order_items(&mut tx, order).await?;

        for item in &items {
            self.ledger
                .try_deduct(&mut tx, item.product_uuid, item.quantity)
                .await?;
        }

        let mut record = self
            .orders
            .update_status(&mut tx, order, OrderStatus::Approved)
            .await?;

        tx.commit().await?;

        record.items = items;

        info!(display_id = %record.display_id, "order approved");

        self.notify_buyer_best_effort(
            tenant,
            record.buyer_uuid,
            Notification::info(
                "Order approved",
                format!("Your order {} is being prepared.", record.display_id),
            )
            .with_deep_link(format!("/orders/{}", record.display_id)),
        )
        .await;

        Ok(record)
    }

    #[tracing::instrument(
        name = "orders.service.transition_status",
        skip(self),
        fields(tenant_uuid = %tenant, order_uuid = %order, to = to.as_str()),
        err
    )]
    async fn transition_status(
        &self,
        tenant: TenantUuid,
        order: OrderUuid,
        to: OrderStatus,
    ) -> Result<OrderRecord, OrdersServiceError> {
        let mut tx = self.db.begin_tenant_transaction(tenant).await?;

        let record = self
            .orders
            .lock_order(&mut tx, order)
            .await?
            .ok_or(OrdersServiceError::NotFound)?;

        let from = record.status;
        let record = self.transition_locked(&mut tx, record, to).await?;
        let record = self.load_items(&mut tx, record).await?;

        tx.commit().await?;

        info!(display_id = %record.display_id, from = from.as_str(), "order status changed");

        self.notify_buyer_best_effort(
            tenant,
            record.buyer_uuid,
            Notification::info(
                "Order update",
                format!("Your order {} is now {}.", record.display_id, to),
            )
            .with_deep_link(format!("/orders/{}", record.display_id)),
        )
        .await;

        Ok(record)
    }

    #[tracing::instrument(
        name = "orders.service.cancel_order",
        skip(self),
        fields(tenant_uuid = %tenant, order_uuid = %order),
        err
    )]
    async fn cancel_order(
        &self,
        tenant: TenantUuid,
        order: OrderUuid,
    ) -> Result<OrderRecord, OrdersServiceError> {
        let mut tx = self.db.begin_tenant_transaction(tenant).await?;

        let record = self
            .orders
            .lock_order(&mut tx, order)
            .await?
            .ok_or(OrdersServiceError::NotFound)?;

        // Cancellation does not restock: any stock already deducted for this
        // order stays deducted and is reconciled out of band.
        let record = self
            .transition_locked(&mut tx, record, OrderStatus::Cancelled)
            .await?;
        let record = self.load_items(&mut tx, record).await?;

        tx.commit().await?;

        info!(display_id = %record.display_id, "order cancelled");

        self.notify_buyer_best_effort(
            tenant,
            record.buyer_uuid,
            Notification::info(
                "Order cancelled",
                format!("Your order {} has been cancelled.", record.display_id),
            )
            .with_severity(Severity::Warning)
            .with_deep_link(format!("/orders/{}", record.display_id)),
        )
        .await;

        Ok(record)
    }
}

#[automock]
#[async_trait]
pub trait OrdersService: Send + Sync {
    /// Check out a cart or a direct list of lines into an order.
    ///
    /// Prices are frozen into the order items at this point and never
    /// recomputed. Cash-on-delivery orders are approved and stock-deducted
    /// immediately; gateway orders stay pending until payment reconciliation.
    async fn create_order(
        &self,
        tenant: TenantUuid,
        order: NewOrder,
    ) -> Result<OrderRecord, OrdersServiceError>;

    async fn get_order(
        &self,
        tenant: TenantUuid,
        order: OrderUuid,
    ) -> Result<OrderRecord, OrdersServiceError>;

    /// All of a buyer's orders, newest first.
    async fn list_orders(
        &self,
        tenant: TenantUuid,
        buyer: BuyerUuid,
    ) -> Result<Vec<OrderRecord>, OrdersServiceError>;

    /// Approve a pending order, performing its stock deduction.
    async fn approve_order(
        &self,
        tenant: TenantUuid,
        order: OrderUuid,
    ) -> Result<OrderRecord, OrdersServiceError>;

    /// Move the order to another fulfilment state. Only terminal states
    /// (delivered, cancelled) refuse further transitions; the workflow is
    /// otherwise unordered.
    async fn transition_status(
        &self,
        tenant: TenantUuid,
        order: OrderUuid,
        to: OrderStatus,
    ) -> Result<OrderRecord, OrdersServiceError>;

    /// Cancel an order that is not yet delivered. Stock is not restored.
    async fn cancel_order(
        &self,
        tenant: TenantUuid,
        order: OrderUuid,
    ) -> Result<OrderRecord, OrdersServiceError>;
}
