//! Payments service.
//!
//! The reconciliation bridge between the external gateway and the order
//! state machine. Verification is idempotent: the same gateway payment can
//! be confirmed any number of times (duplicate webhooks, manual retries)
//! and results in exactly one transaction record and at most one stock
//! deduction.

use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;
use tracing::{info, warn};

use crate::{
    database::Db,
    domain::{
        notifications::{Notification, NotificationDispatcher, Severity},
        orders::{
            records::{OrderRecord, OrderStatus, OrderUuid, PaymentMethod, PaymentStatus},
            repositories::{PgOrderItemsRepository, PgOrdersRepository},
        },
        payments::{
            errors::PaymentsServiceError,
            gateway::{GatewayPayment, GatewayPaymentStatus, PaymentGateway},
            records::{TransactionRecord, TransactionStatus},
            repository::PgTransactionsRepository,
        },
        stock::ledger::PgStockLedger,
        tenants::records::TenantUuid,
    },
};

/// Outcome of a successful verification call.
#[derive(Debug, Clone)]
pub struct VerifiedPayment {
    pub order: OrderRecord,
    pub transaction: TransactionRecord,
}

#[derive(Clone)]
pub struct PgPaymentsService {
    db: Db,
    orders: PgOrdersRepository,
    order_items: PgOrderItemsRepository,
    transactions: PgTransactionsRepository,
    ledger: PgStockLedger,
    gateway: Arc<dyn PaymentGateway>,
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl PgPaymentsService {
    #[must_use]
    pub fn new(
        db: Db,
        gateway: Arc<dyn PaymentGateway>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            db,
            orders: PgOrdersRepository::new(),
            order_items: PgOrderItemsRepository::new(),
            transactions: PgTransactionsRepository::new(),
            ledger: PgStockLedger::new(),
            gateway,
            dispatcher,
        }
    }

    /// Assign the invoice number in its own transaction, after the payment
    /// state is committed. A failure here is logged and swallowed, never
    /// reverting the payment.
    async fn assign_invoice_best_effort(&self, tenant: TenantUuid, order: &mut OrderRecord) {
        let invoice_number = format!("INV-{}", order.display_id.trim_start_matches("ORD-"));

        let assigned: Result<Option<String>, sqlx::Error> = async {
            let mut tx = self.db.begin_tenant_transaction(tenant).await?;
            let assigned = self
                .orders
                .set_invoice_number(&mut tx, order.uuid, &invoice_number)
                .await?;
            tx.commit().await?;

            Ok(assigned)
        }
        .await;

        match assigned {
            Ok(assigned) => order.invoice_number = assigned,
            Err(error) => {
                warn!(order_uuid = %order.uuid, %error, "invoice number assignment failed");
            }
        }
    }

    async fn notify_buyer_best_effort(
        &self,
        tenant: TenantUuid,
        order: &OrderRecord,
        notification: Notification,
    ) {
        if let Err(error) = self
            .dispatcher
            .notify_buyer(tenant, order.buyer_uuid, notification)
            .await
        {
            warn!(order_uuid = %order.uuid, %error, "buyer notification failed");
        }
    }

    async fn notify_admins_best_effort(&self, tenant: TenantUuid, notification: Notification) {
        if let Err(error) = self.dispatcher.notify_admins(tenant, notification).await {
            warn!(%error, "admin notification failed");
        }
    }

    /// Settle a confirmed payment inside the caller's transaction, which
    /// already holds the order's row lock.
    async fn settle_success(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        payment: &GatewayPayment,
        order: OrderRecord,
    ) -> Result<VerifiedPayment, PaymentsServiceError> {
        let transaction = self
            .transactions
            .upsert_transaction(
                tx,
                order.uuid,
                order.buyer_uuid,
                &payment.id,
                payment.amount,
                TransactionStatus::Success,
                &payment.metadata,
            )
            .await?;

        let items = self.order_items.get_order_items(tx, order.uuid).await?;

        // An order already approved (manual approval before the webhook
        // arrived) has had its deduction; paying it must not deduct again.
        if order.status != OrderStatus::Approved {
            for item in &items {
                self.ledger
                    .try_deduct(tx, item.product_uuid, item.quantity)
                    .await?;
            }
        }

        // Paid and approved land in the same statement: no reader observes
        // one without the other.
        let mut order = self
            .orders
            .set_payment_state(tx, order.uuid, OrderStatus::Approved, PaymentStatus::Paid)
            .await?;

        order.items = items;

        info!(
            order_uuid = %order.uuid,
            display_id = %order.display_id,
            gateway_payment_id = %payment.id,
            "payment confirmed"
        );

        Ok(VerifiedPayment { order, transaction })
    }

    /// Record a failed payment inside the caller's locked transaction.
    async fn settle_failure(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        payment: &GatewayPayment,
        order: OrderRecord,
    ) -> Result<VerifiedPayment, PaymentsServiceError> {
        let transaction = self
            .transactions
            .upsert_transaction(
                tx,
                order.uuid,
                order.buyer_uuid,
                &payment.id,
                payment.amount,
                TransactionStatus::Failed,
                &payment.metadata,
            )
            .await?;

        // The fulfilment status stays where it was (normally PENDING), so
        // the buyer can retry the payment against the same order.
        let mut order = self
            .orders
            .set_payment_state(tx, order.uuid, order.status, PaymentStatus::Failed)
            .await?;

        order.items = self.order_items.get_order_items(tx, order.uuid).await?;

        info!(
            order_uuid = %order.uuid,
            display_id = %order.display_id,
            gateway_payment_id = %payment.id,
            "payment failed"
        );

        Ok(VerifiedPayment { order, transaction })
    }
}

#[async_trait]
impl PaymentsService for PgPaymentsService {
    #[tracing::instrument(
        name = "payments.service.initiate_payment",
        skip(self),
        fields(tenant_uuid = %tenant, order_uuid = %order),
        err
    )]
    async fn initiate_payment(
        &self,
        tenant: TenantUuid,
        order: OrderUuid,
    ) -> Result<TransactionRecord, PaymentsServiceError> {
        let mut tx = self.db.begin_tenant_transaction(tenant).await?;

        let record = self
            .orders
            .get_order(&mut tx, order)
            .await?
            .ok_or(PaymentsServiceError::OrderNotFound)?;

        tx.commit().await?;

        if record.payment_method != PaymentMethod::Gateway
            || record.payment_status == PaymentStatus::Paid
            || record.status.is_terminal()
        {
            return Err(PaymentsServiceError::NotGatewayPayable);
        }

        // The gateway call runs outside any database transaction; its
        // timeout bounds the whole operation.
        let payment = self
            .gateway
            .create_payment(record.total_amount, record.uuid)
            .await?;

        let mut tx = self.db.begin_tenant_transaction(tenant).await?;

        let transaction = self
            .transactions
            .upsert_transaction(
                &mut tx,
                record.uuid,
                record.buyer_uuid,
                &payment.id,
                payment.amount,
                TransactionStatus::Pending,
                &payment.metadata,
            )
            .await?;

        tx.commit().await?;

        info!(gateway_payment_id = %transaction.gateway_payment_id, "payment initiated");

        Ok(transaction)
    }

    #[tracing::instrument(
        name = "payments.service.list_transactions",
        skip(self),
        fields(tenant_uuid = %tenant, order_uuid = %order),
        err
    )]
    async fn list_transactions(
        &self,
        tenant: TenantUuid,
        order: OrderUuid,
    ) -> Result<Vec<TransactionRecord>, PaymentsServiceError> {
        let mut tx = self.db.begin_tenant_transaction(tenant).await?;

        let transactions = self.transactions.list_by_order(&mut tx, order).await?;

        tx.commit().await?;

        Ok(transactions)
    }

    #[tracing::instrument(
        name = "payments.service.verify_payment",
        skip(self),
        fields(tenant_uuid = %tenant, gateway_payment_id),
        err
    )]
    async fn verify_payment(
        &self,
        tenant: TenantUuid,
        gateway_payment_id: &str,
    ) -> Result<VerifiedPayment, PaymentsServiceError> {
        // The gateway is the authority on the payment's state.
        let payment = self.gateway.fetch_payment(gateway_payment_id).await?;

        let order_uuid = payment
            .order_uuid
            .ok_or(PaymentsServiceError::OrderCorrelationMissing)?;

        let mut tx = self.db.begin_tenant_transaction(tenant).await?;

        let order = self
            .orders
            .lock_order(&mut tx, order_uuid)
            .await?
            .ok_or(PaymentsServiceError::OrderNotFound)?;

        let existing = self
            .transactions
            .find_by_gateway_payment_id(&mut tx, &payment.id)
            .await?;

        if let Some(existing) = &existing
            && existing.order_uuid != order.uuid
        {
            return Err(PaymentsServiceError::MismatchedOrder {
                recorded: existing.order_uuid,
                reported: order.uuid,
            });
        }

        // Already paid: duplicate webhook or repeated manual verification.
        // Return what we have, touch nothing. A transaction fabricated here
        // (the payment was settled out of band) records what the gateway
        // reported, not an assumed success.
        if order.payment_status == PaymentStatus::Paid {
            let transaction = match existing {
                Some(transaction) => transaction,
                None => {
                    self.transactions
                        .upsert_transaction(
                            &mut tx,
                            order.uuid,
                            order.buyer_uuid,
                            &payment.id,
                            payment.amount,
                            TransactionStatus::from(payment.status),
                            &payment.metadata,
                        )
                        .await?
                }
            };

            let mut order = order;
            order.items = self.order_items.get_order_items(&mut tx, order.uuid).await?;

            tx.commit().await?;

            return Ok(VerifiedPayment { order, transaction });
        }

        // An unpaid order in a terminal state (cancelled while the payment
        // was in flight) must not be resurrected. Record the gateway's
        // report for manual reconciliation; status and stock stay put.
        if order.status.is_terminal() {
            self.transactions
                .upsert_transaction(
                    &mut tx,
                    order.uuid,
                    order.buyer_uuid,
                    &payment.id,
                    payment.amount,
                    TransactionStatus::from(payment.status),
                    &payment.metadata,
                )
                .await?;

            tx.commit().await?;

            warn!(
                order_uuid = %order.uuid,
                status = %order.status,
                gateway_payment_id = %payment.id,
                "payment reported for a closed order"
            );

            return Err(PaymentsServiceError::InvalidOrderState {
                order: order.uuid,
                status: order.status,
            });
        }

        let confirmed = payment.status == GatewayPaymentStatus::Success;

        let mut verified = if confirmed {
            self.settle_success(&mut tx, &payment, order).await?
        } else {
            self.settle_failure(&mut tx, &payment, order).await?
        };

        tx.commit().await?;

        // Everything from here on is best effort: a lost invoice number or
        // notification never reverts the committed payment state.
        if confirmed {
            self.assign_invoice_best_effort(tenant, &mut verified.order)
                .await;

            self.notify_buyer_best_effort(
                tenant,
                &verified.order,
                Notification::info(
                    "Payment received",
                    format!(
                        "Payment for order {} is confirmed.",
                        verified.order.display_id
                    ),
                )
                .with_deep_link(format!("/orders/{}", verified.order.display_id)),
            )
            .await;

            self.notify_admins_best_effort(
                tenant,
                Notification::info(
                    "Order paid",
                    format!("Order {} has been paid.", verified.order.display_id),
                )
                .with_deep_link(format!("/admin/orders/{}", verified.order.display_id)),
            )
            .await;
        } else {
            self.notify_buyer_best_effort(
                tenant,
                &verified.order,
                Notification::info(
                    "Payment failed",
                    format!(
                        "Payment for order {} did not go through. You can retry.",
                        verified.order.display_id
                    ),
                )
                .with_severity(Severity::Warning)
                .with_deep_link(format!("/orders/{}/pay", verified.order.display_id)),
            )
            .await;

            self.notify_admins_best_effort(
                tenant,
                Notification::info(
                    "Checkout abandoned",
                    format!("Payment for order {} failed.", verified.order.display_id),
                )
                .with_severity(Severity::Warning)
                .with_deep_link(format!("/admin/orders/{}", verified.order.display_id)),
            )
            .await;
        }

        Ok(verified)
    }
}

#[automock]
#[async_trait]
pub trait PaymentsService: Send + Sync {
    /// Create a payment at the gateway for a pending gateway-paid order,
    /// recording a pending transaction carrying the gateway's payment id.
    async fn initiate_payment(
        &self,
        tenant: TenantUuid,
        order: OrderUuid,
    ) -> Result<TransactionRecord, PaymentsServiceError>;

    /// Every payment attempt recorded against an order, oldest first.
    async fn list_transactions(
        &self,
        tenant: TenantUuid,
        order: OrderUuid,
    ) -> Result<Vec<TransactionRecord>, PaymentsServiceError>;

    /// Reconcile a gateway payment against its order.
    ///
    /// Fetches the authoritative payment state, resolves the order through
    /// the correlation token embedded at initiation, and settles: success
    /// marks the order paid and approved and deducts stock; anything else
    /// marks the payment failed and leaves the order open for retry.
    /// Idempotent with respect to the gateway payment id.
    async fn verify_payment(
        &self,
        tenant: TenantUuid,
        gateway_payment_id: &str,
    ) -> Result<VerifiedPayment, PaymentsServiceError>;
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;
    use testresult::TestResult;

    use crate::{
        domain::{
            buyers::records::BuyerRole,
            notifications::MockNotificationDispatcher,
            orders::{
                OrdersService,
                data::{NewOrder, NewOrderLine, OrderSource},
                records::DeliveryDetails,
            },
            payments::gateway::{GatewayError, MockPaymentGateway},
            pricing::data::Selections,
            products::{ProductsService, data::NewProduct, records::ProductUuid},
        },
        test::TestContext,
    };

    use super::*;

    fn delivery() -> DeliveryDetails {
        DeliveryDetails {
            recipient: "Asha Devi".to_string(),
            phone: "+94 77 000 0000".to_string(),
            address: "12 Flower Road".to_string(),
            city: "Colombo".to_string(),
            notes: None,
        }
    }

    fn gateway_payment(
        id: &str,
        status: GatewayPaymentStatus,
        amount: u64,
        order: Option<crate::domain::orders::records::OrderUuid>,
    ) -> GatewayPayment {
        GatewayPayment {
            id: id.to_string(),
            status,
            amount,
            transaction_id: Some(format!("txn_{id}")),
            order_uuid: order,
            metadata: serde_json::json!({ "id": id }),
        }
    }

    fn quiet_dispatcher() -> MockNotificationDispatcher {
        let mut dispatcher = MockNotificationDispatcher::new();
        dispatcher.expect_notify_buyer().returning(|_, _, _| Ok(()));
        dispatcher.expect_notify_admins().returning(|_, _| Ok(()));
        dispatcher
    }

    async fn pending_gateway_order(
        ctx: &TestContext,
        buyer: crate::domain::buyers::records::BuyerUuid,
        product: ProductUuid,
        quantity: u64,
    ) -> Result<OrderRecord, crate::domain::orders::OrdersServiceError> {
        ctx.orders
            .create_order(
                ctx.tenant_uuid,
                NewOrder {
                    buyer_uuid: buyer,
                    payment_method: PaymentMethod::Gateway,
                    delivery: delivery(),
                    source: OrderSource::Lines(vec![NewOrderLine {
                        product_uuid: product,
                        quantity,
                        selections: Selections::none(),
                    }]),
                },
            )
            .await
    }

    #[tokio::test]
    async fn successful_verification_pays_approves_deducts_and_invoices() -> TestResult {
        let ctx = TestContext::new().await;
        let buyer = ctx.create_buyer(BuyerRole::Retail).await?;
        let product = ProductUuid::new();

        ctx.products
            .create_product(ctx.tenant_uuid, NewProduct::simple(product, "Lilies", 500, 10))
            .await?;

        let order = pending_gateway_order(&ctx, buyer, product, 4).await?;

        let mut gateway = MockPaymentGateway::new();
        let order_uuid = order.uuid;
        gateway
            .expect_fetch_payment()
            .with(eq("pay_1"))
            .returning(move |id| {
                Ok(gateway_payment(
                    id,
                    GatewayPaymentStatus::Success,
                    2_000,
                    Some(order_uuid),
                ))
            });

        let mut dispatcher = MockNotificationDispatcher::new();
        dispatcher
            .expect_notify_buyer()
            .once()
            .returning(|_, _, _| Ok(()));
        dispatcher
            .expect_notify_admins()
            .once()
            .returning(|_, _| Ok(()));

        let payments = ctx.payments(Arc::new(gateway), Arc::new(dispatcher));

        let verified = payments.verify_payment(ctx.tenant_uuid, "pay_1").await?;

        assert_eq!(verified.order.payment_status, PaymentStatus::Paid);
        assert_eq!(verified.order.status, OrderStatus::Approved);
        assert_eq!(verified.transaction.status, TransactionStatus::Success);
        assert_eq!(verified.transaction.gateway_payment_id, "pay_1");

        let invoice = verified.order.invoice_number.as_deref();
        assert!(
            invoice.is_some_and(|inv| inv.starts_with("INV-")),
            "expected an invoice number, got {invoice:?}"
        );

        let remaining = ctx.products.get_product(ctx.tenant_uuid, product).await?;
        assert_eq!(remaining.stock, 6);

        Ok(())
    }

    #[tokio::test]
    async fn verification_is_idempotent() -> TestResult {
        let ctx = TestContext::new().await;
        let buyer = ctx.create_buyer(BuyerRole::Retail).await?;
        let product = ProductUuid::new();

        ctx.products
            .create_product(ctx.tenant_uuid, NewProduct::simple(product, "Lilies", 500, 10))
            .await?;

        let order = pending_gateway_order(&ctx, buyer, product, 4).await?;

        let mut gateway = MockPaymentGateway::new();
        let order_uuid = order.uuid;
        gateway.expect_fetch_payment().returning(move |id| {
            Ok(gateway_payment(
                id,
                GatewayPaymentStatus::Success,
                2_000,
                Some(order_uuid),
            ))
        });

        let payments = ctx.payments(Arc::new(gateway), Arc::new(quiet_dispatcher()));

        let first = payments.verify_payment(ctx.tenant_uuid, "pay_1").await?;
        let second = payments.verify_payment(ctx.tenant_uuid, "pay_1").await?;

        // One financial record, one deduction.
        assert_eq!(first.transaction.uuid, second.transaction.uuid);

        let remaining = ctx.products.get_product(ctx.tenant_uuid, product).await?;
        assert_eq!(remaining.stock, 6, "stock must be deducted exactly once");

        Ok(())
    }

    #[tokio::test]
    async fn paid_orders_short_circuit_even_when_gateway_flips() -> TestResult {
        let ctx = TestContext::new().await;
        let buyer = ctx.create_buyer(BuyerRole::Retail).await?;
        let product = ProductUuid::new();

        ctx.products
            .create_product(ctx.tenant_uuid, NewProduct::simple(product, "Lilies", 500, 10))
            .await?;

        let order = pending_gateway_order(&ctx, buyer, product, 2).await?;
        let order_uuid = order.uuid;

        let mut gateway = MockPaymentGateway::new();
        let mut first = true;
        gateway.expect_fetch_payment().returning(move |id| {
            let status = if first {
                first = false;
                GatewayPaymentStatus::Success
            } else {
                GatewayPaymentStatus::Failed
            };

            Ok(gateway_payment(id, status, 1_000, Some(order_uuid)))
        });

        let payments = ctx.payments(Arc::new(gateway), Arc::new(quiet_dispatcher()));

        payments.verify_payment(ctx.tenant_uuid, "pay_1").await?;

        // The later contradictory report must not unpay the order.
        let second = payments.verify_payment(ctx.tenant_uuid, "pay_1").await?;

        assert_eq!(second.order.payment_status, PaymentStatus::Paid);
        assert_eq!(second.transaction.status, TransactionStatus::Success);

        Ok(())
    }

    #[tokio::test]
    async fn failed_payment_keeps_order_open_for_retry() -> TestResult {
        let ctx = TestContext::new().await;
        let buyer = ctx.create_buyer(BuyerRole::Retail).await?;
        let product = ProductUuid::new();

        ctx.products
            .create_product(ctx.tenant_uuid, NewProduct::simple(product, "Lilies", 500, 10))
            .await?;

        let order = pending_gateway_order(&ctx, buyer, product, 3).await?;
        let order_uuid = order.uuid;

        let mut gateway = MockPaymentGateway::new();
        gateway.expect_fetch_payment().returning(move |id| {
            Ok(gateway_payment(
                id,
                GatewayPaymentStatus::Failed,
                1_500,
                Some(order_uuid),
            ))
        });

        let mut dispatcher = MockNotificationDispatcher::new();
        dispatcher
            .expect_notify_buyer()
            .once()
            .returning(|_, _, _| Ok(()));
        dispatcher
            .expect_notify_admins()
            .once()
            .returning(|_, _| Ok(()));

        let payments = ctx.payments(Arc::new(gateway), Arc::new(dispatcher));

        let verified = payments.verify_payment(ctx.tenant_uuid, "pay_1").await?;

        assert_eq!(verified.order.payment_status, PaymentStatus::Failed);
        assert_eq!(verified.order.status, OrderStatus::Pending);
        assert_eq!(verified.transaction.status, TransactionStatus::Failed);
        assert!(verified.order.invoice_number.is_none());

        // A failed payment never touches stock.
        let remaining = ctx.products.get_product(ctx.tenant_uuid, product).await?;
        assert_eq!(remaining.stock, 10);

        Ok(())
    }

    #[tokio::test]
    async fn order_payment_history_keeps_every_attempt() -> TestResult {
        let ctx = TestContext::new().await;
        let buyer = ctx.create_buyer(BuyerRole::Retail).await?;
        let product = ProductUuid::new();

        ctx.products
            .create_product(ctx.tenant_uuid, NewProduct::simple(product, "Lilies", 500, 10))
            .await?;

        let order = pending_gateway_order(&ctx, buyer, product, 2).await?;
        let order_uuid = order.uuid;

        let mut gateway = MockPaymentGateway::new();
        gateway.expect_fetch_payment().returning(move |id| {
            let status = if id == "pay_failed" {
                GatewayPaymentStatus::Failed
            } else {
                GatewayPaymentStatus::Success
            };

            Ok(gateway_payment(id, status, 1_000, Some(order_uuid)))
        });

        let payments = ctx.payments(Arc::new(gateway), Arc::new(quiet_dispatcher()));

        // A failed attempt followed by a successful retry with a new
        // gateway payment.
        payments.verify_payment(ctx.tenant_uuid, "pay_failed").await?;
        payments.verify_payment(ctx.tenant_uuid, "pay_ok").await?;

        let history = payments
            .list_transactions(ctx.tenant_uuid, order_uuid)
            .await?;

        assert_eq!(history.len(), 2);
        assert_eq!(history[0].status, TransactionStatus::Failed);
        assert_eq!(history[1].status, TransactionStatus::Success);

        Ok(())
    }

    #[tokio::test]
    async fn late_webhook_cannot_resurrect_a_cancelled_order() -> TestResult {
        let ctx = TestContext::new().await;
        let buyer = ctx.create_buyer(BuyerRole::Retail).await?;
        let product = ProductUuid::new();

        ctx.products
            .create_product(ctx.tenant_uuid, NewProduct::simple(product, "Lilies", 500, 10))
            .await?;

        let order = pending_gateway_order(&ctx, buyer, product, 2).await?;
        let order_uuid = order.uuid;

        // The buyer cancels while the gateway payment is still in flight.
        ctx.orders.cancel_order(ctx.tenant_uuid, order_uuid).await?;

        let mut gateway = MockPaymentGateway::new();
        gateway.expect_fetch_payment().returning(move |id| {
            Ok(gateway_payment(
                id,
                GatewayPaymentStatus::Success,
                1_000,
                Some(order_uuid),
            ))
        });

        let payments = ctx.payments(Arc::new(gateway), Arc::new(quiet_dispatcher()));

        let result = payments.verify_payment(ctx.tenant_uuid, "pay_1").await;

        assert!(
            matches!(
                result,
                Err(PaymentsServiceError::InvalidOrderState { order, status })
                    if order == order_uuid && status == OrderStatus::Cancelled
            ),
            "expected InvalidOrderState, got {result:?}"
        );

        // The order stays dead and stock stays put.
        let order = ctx.orders.get_order(ctx.tenant_uuid, order_uuid).await?;
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.payment_status, PaymentStatus::Pending);

        let remaining = ctx.products.get_product(ctx.tenant_uuid, product).await?;
        assert_eq!(remaining.stock, 10);

        // The gateway's report is still on file for manual reconciliation.
        let history = payments
            .list_transactions(ctx.tenant_uuid, order_uuid)
            .await?;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, TransactionStatus::Success);

        Ok(())
    }

    #[tokio::test]
    async fn cancelled_orders_cannot_initiate_payments() -> TestResult {
        let ctx = TestContext::new().await;
        let buyer = ctx.create_buyer(BuyerRole::Retail).await?;
        let product = ProductUuid::new();

        ctx.products
            .create_product(ctx.tenant_uuid, NewProduct::simple(product, "Lilies", 500, 10))
            .await?;

        let order = pending_gateway_order(&ctx, buyer, product, 1).await?;
        ctx.orders.cancel_order(ctx.tenant_uuid, order.uuid).await?;

        let gateway = MockPaymentGateway::new();
        let payments = ctx.payments(Arc::new(gateway), Arc::new(quiet_dispatcher()));

        let result = payments.initiate_payment(ctx.tenant_uuid, order.uuid).await;

        assert!(
            matches!(result, Err(PaymentsServiceError::NotGatewayPayable)),
            "expected NotGatewayPayable, got {result:?}"
        );

        Ok(())
    }

    #[tokio::test]
    async fn paid_order_records_a_second_payment_as_reported() -> TestResult {
        let ctx = TestContext::new().await;
        let buyer = ctx.create_buyer(BuyerRole::Retail).await?;
        let product = ProductUuid::new();

        ctx.products
            .create_product(ctx.tenant_uuid, NewProduct::simple(product, "Lilies", 500, 10))
            .await?;

        let order = pending_gateway_order(&ctx, buyer, product, 2).await?;
        let order_uuid = order.uuid;

        let mut gateway = MockPaymentGateway::new();
        gateway.expect_fetch_payment().returning(move |id| {
            let status = if id == "pay_1" {
                GatewayPaymentStatus::Success
            } else {
                GatewayPaymentStatus::Failed
            };

            Ok(gateway_payment(id, status, 1_000, Some(order_uuid)))
        });

        let payments = ctx.payments(Arc::new(gateway), Arc::new(quiet_dispatcher()));

        payments.verify_payment(ctx.tenant_uuid, "pay_1").await?;

        // A different, failed gateway payment against the already-paid
        // order is recorded with the status the gateway reported.
        let second = payments.verify_payment(ctx.tenant_uuid, "pay_2").await?;

        assert_eq!(second.order.payment_status, PaymentStatus::Paid);
        assert_eq!(second.transaction.status, TransactionStatus::Failed);
        assert_eq!(second.transaction.gateway_payment_id, "pay_2");

        Ok(())
    }

    #[tokio::test]
    async fn notification_failures_do_not_revert_payment() -> TestResult {
        let ctx = TestContext::new().await;
        let buyer = ctx.create_buyer(BuyerRole::Retail).await?;
        let product = ProductUuid::new();

        ctx.products
            .create_product(ctx.tenant_uuid, NewProduct::simple(product, "Lilies", 500, 10))
            .await?;

        let order = pending_gateway_order(&ctx, buyer, product, 2).await?;
        let order_uuid = order.uuid;

        let mut gateway = MockPaymentGateway::new();
        gateway.expect_fetch_payment().returning(move |id| {
            Ok(gateway_payment(
                id,
                GatewayPaymentStatus::Success,
                1_000,
                Some(order_uuid),
            ))
        });

        let mut dispatcher = MockNotificationDispatcher::new();
        dispatcher.expect_notify_buyer().returning(|_, _, _| {
            Err(crate::domain::notifications::DispatchError::ChannelUnavailable(
                "smtp down".to_string(),
            ))
        });
        dispatcher.expect_notify_admins().returning(|_, _| {
            Err(crate::domain::notifications::DispatchError::ChannelUnavailable(
                "smtp down".to_string(),
            ))
        });

        let payments = ctx.payments(Arc::new(gateway), Arc::new(dispatcher));

        let verified = payments.verify_payment(ctx.tenant_uuid, "pay_1").await?;

        assert_eq!(verified.order.payment_status, PaymentStatus::Paid);

        Ok(())
    }

    #[tokio::test]
    async fn unknown_payment_is_not_found() -> TestResult {
        let ctx = TestContext::new().await;

        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_fetch_payment()
            .returning(|_| Err(GatewayError::NotFound));

        let payments = ctx.payments(Arc::new(gateway), Arc::new(quiet_dispatcher()));

        let result = payments.verify_payment(ctx.tenant_uuid, "pay_missing").await;

        assert!(
            matches!(result, Err(PaymentsServiceError::PaymentNotFound)),
            "expected PaymentNotFound, got {result:?}"
        );

        Ok(())
    }

    #[tokio::test]
    async fn missing_correlation_needs_manual_reconciliation() -> TestResult {
        let ctx = TestContext::new().await;

        let mut gateway = MockPaymentGateway::new();
        gateway.expect_fetch_payment().returning(|id| {
            Ok(gateway_payment(id, GatewayPaymentStatus::Success, 1_000, None))
        });

        let payments = ctx.payments(Arc::new(gateway), Arc::new(quiet_dispatcher()));

        let result = payments.verify_payment(ctx.tenant_uuid, "pay_1").await;

        assert!(
            matches!(result, Err(PaymentsServiceError::OrderCorrelationMissing)),
            "expected OrderCorrelationMissing, got {result:?}"
        );

        Ok(())
    }

    #[tokio::test]
    async fn gateway_payment_id_bound_to_two_orders_is_fatal() -> TestResult {
        let ctx = TestContext::new().await;
        let buyer = ctx.create_buyer(BuyerRole::Retail).await?;
        let product = ProductUuid::new();

        ctx.products
            .create_product(ctx.tenant_uuid, NewProduct::simple(product, "Lilies", 500, 10))
            .await?;

        let first_order = pending_gateway_order(&ctx, buyer, product, 1).await?;
        let second_order = pending_gateway_order(&ctx, buyer, product, 1).await?;

        let first_uuid = first_order.uuid;
        let second_uuid = second_order.uuid;

        let mut gateway = MockPaymentGateway::new();
        let mut first = true;
        gateway.expect_fetch_payment().returning(move |id| {
            let order = if first {
                first = false;
                first_uuid
            } else {
                second_uuid
            };

            Ok(gateway_payment(
                id,
                GatewayPaymentStatus::Success,
                500,
                Some(order),
            ))
        });

        let payments = ctx.payments(Arc::new(gateway), Arc::new(quiet_dispatcher()));

        payments.verify_payment(ctx.tenant_uuid, "pay_1").await?;

        // The same gateway payment now claims a different order.
        let result = payments.verify_payment(ctx.tenant_uuid, "pay_1").await;

        assert!(
            matches!(
                result,
                Err(PaymentsServiceError::MismatchedOrder { recorded, reported })
                    if recorded == first_uuid && reported == second_uuid
            ),
            "expected MismatchedOrder, got {result:?}"
        );

        Ok(())
    }

    #[tokio::test]
    async fn initiation_records_a_pending_transaction() -> TestResult {
        let ctx = TestContext::new().await;
        let buyer = ctx.create_buyer(BuyerRole::Retail).await?;
        let product = ProductUuid::new();

        ctx.products
            .create_product(ctx.tenant_uuid, NewProduct::simple(product, "Lilies", 500, 10))
            .await?;

        let order = pending_gateway_order(&ctx, buyer, product, 2).await?;

        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_create_payment()
            .with(eq(1_000u64), eq(order.uuid))
            .once()
            .returning(|amount, order| {
                Ok(gateway_payment(
                    "pay_new",
                    GatewayPaymentStatus::Pending,
                    amount,
                    Some(order),
                ))
            });

        let payments = ctx.payments(Arc::new(gateway), Arc::new(quiet_dispatcher()));

        let transaction = payments.initiate_payment(ctx.tenant_uuid, order.uuid).await?;

        assert_eq!(transaction.status, TransactionStatus::Pending);
        assert_eq!(transaction.gateway_payment_id, "pay_new");
        assert_eq!(transaction.order_uuid, order.uuid);
        assert_eq!(transaction.amount, 1_000);

        Ok(())
    }

    #[tokio::test]
    async fn cod_orders_cannot_be_paid_through_the_gateway() -> TestResult {
        let ctx = TestContext::new().await;
        let buyer = ctx.create_buyer(BuyerRole::Retail).await?;
        let product = ProductUuid::new();

        ctx.products
            .create_product(ctx.tenant_uuid, NewProduct::simple(product, "Lilies", 500, 10))
            .await?;

        let order = ctx
            .orders
            .create_order(
                ctx.tenant_uuid,
                NewOrder {
                    buyer_uuid: buyer,
                    payment_method: PaymentMethod::CashOnDelivery,
                    delivery: delivery(),
                    source: OrderSource::Lines(vec![NewOrderLine {
                        product_uuid: product,
                        quantity: 1,
                        selections: Selections::none(),
                    }]),
                },
            )
            .await?;

        let gateway = MockPaymentGateway::new();
        let payments = ctx.payments(Arc::new(gateway), Arc::new(quiet_dispatcher()));

        let result = payments.initiate_payment(ctx.tenant_uuid, order.uuid).await;

        assert!(
            matches!(result, Err(PaymentsServiceError::NotGatewayPayable)),
            "expected NotGatewayPayable, got {result:?}"
        );

        Ok(())
    }
}
