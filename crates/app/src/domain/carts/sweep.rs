//! Abandoned cart sweep.
//!
//! Periodically walks every tenant looking for carts that still hold items
//! but have not been touched for a while, and nudges their owners.

use std::{sync::Arc, time::Duration};

use jiff::{Timestamp, ToSpan};
use tracing::{info, warn};

use crate::{
    database::Db,
    domain::{
        carts::repositories::PgCartsRepository,
        notifications::{Notification, NotificationDispatcher},
        tenants::repository::PgTenantsRepository,
    },
};

#[derive(Debug, Clone, Copy)]
pub struct SweepConfig {
    /// How often the sweep runs.
    pub interval: Duration,
    /// How long a cart must sit untouched before it counts as abandoned.
    pub abandoned_after_hours: i64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60 * 60),
            abandoned_after_hours: 24,
        }
    }
}

pub struct CartSweeper {
    db: Db,
    config: SweepConfig,
    tenants: PgTenantsRepository,
    carts: PgCartsRepository,
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl CartSweeper {
    #[must_use]
    pub fn new(db: Db, config: SweepConfig, dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        let tenants = PgTenantsRepository::new(db.pool().clone());

        Self {
            db,
            config,
            tenants,
            carts: PgCartsRepository::new(),
            dispatcher,
        }
    }

    /// Run the sweep forever. Intended to be spawned as a background task.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if let Err(error) = self.sweep_once().await {
                warn!(%error, "abandoned cart sweep failed");
            }
        }
    }

    /// A single pass over every tenant.
    #[tracing::instrument(name = "carts.sweep", skip(self), err)]
    pub async fn sweep_once(&self) -> Result<(), sqlx::Error> {
        let cutoff = Timestamp::now() - self.config.abandoned_after_hours.hours();

        for tenant in self.tenants.list_tenants().await? {
            let mut tx = self.db.begin_tenant_transaction(tenant.uuid).await?;
            let carts = self.carts.list_abandoned_carts(&mut tx, cutoff).await?;
            tx.commit().await?;

            if carts.is_empty() {
                continue;
            }

            info!(
                tenant_uuid = %tenant.uuid,
                abandoned = carts.len(),
                "found abandoned carts"
            );

            for cart in carts {
                let notification =
                    Notification::info("You left something behind", "Your cart is still waiting.")
                        .with_deep_link(format!("/cart/{}", cart.uuid));

                // Best effort, a dead channel must not stall the sweep.
                if let Err(error) = self
                    .dispatcher
                    .notify_buyer(tenant.uuid, cart.buyer_uuid, notification)
                    .await
                {
                    warn!(
                        tenant_uuid = %tenant.uuid,
                        buyer_uuid = %cart.buyer_uuid,
                        %error,
                        "abandoned cart notification failed"
                    );
                }
            }
        }

        Ok(())
    }
}
