//! App Context

use std::sync::Arc;

use thiserror::Error;

use crate::{
    database::{self, Db},
    domain::{
        buyers::{BuyersService, PgBuyersService},
        carts::{CartsService, PgCartsService, sweep::CartSweeper, sweep::SweepConfig},
        notifications::NotificationDispatcher,
        orders::{OrdersService, PgOrdersService},
        payments::{
            PaymentsService, PgPaymentsService,
            gateway::{GatewayConfig, GatewayError, HttpPaymentGateway},
        },
        products::{PgProductsService, ProductsService},
        tenants::{PgTenantsService, TenantsService},
    },
};

#[derive(Debug, Error)]
pub enum AppInitError {
    #[error("failed to connect to database")]
    Database(#[source] sqlx::Error),

    #[error("failed to build payment gateway client")]
    Gateway(#[source] GatewayError),
}

/// The wired service graph handed to whatever hosts the application.
#[derive(Clone)]
pub struct AppContext {
    pub db: Db,
    pub tenants: Arc<dyn TenantsService>,
    pub buyers: Arc<dyn BuyersService>,
    pub products: Arc<dyn ProductsService>,
    pub carts: Arc<dyn CartsService>,
    pub orders: Arc<dyn OrdersService>,
    pub payments: Arc<dyn PaymentsService>,
}

impl AppContext {
    /// Build application context from a database URL.
    ///
    /// # Errors
    ///
    /// Returns an error when establishing a database connection or building
    /// the gateway client fails.
    pub async fn from_database_url(
        url: &str,
        gateway: GatewayConfig,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Result<Self, AppInitError> {
        let pool = database::connect(url)
            .await
            .map_err(AppInitError::Database)?;

        let gateway = Arc::new(HttpPaymentGateway::new(gateway).map_err(AppInitError::Gateway)?);

        let db = Db::new(pool.clone());

        Ok(Self {
            tenants: Arc::new(PgTenantsService::new(pool)),
            buyers: Arc::new(PgBuyersService::new(db.clone())),
            products: Arc::new(PgProductsService::new(db.clone())),
            carts: Arc::new(PgCartsService::new(db.clone())),
            orders: Arc::new(PgOrdersService::new(db.clone(), dispatcher.clone())),
            payments: Arc::new(PgPaymentsService::new(db.clone(), gateway, dispatcher.clone())),
            db,
        })
    }

    /// Build the abandoned-cart sweeper over this context's database.
    #[must_use]
    pub fn cart_sweeper(
        &self,
        config: SweepConfig,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> CartSweeper {
        CartSweeper::new(self.db.clone(), config, dispatcher)
    }
}
