//! Test context for service-level integration tests.

use std::sync::Arc;

use sqlx::{Connection, PgConnection, PgPool, query};

use crate::{
    database::Db,
    domain::{
        buyers::{BuyersService, BuyersServiceError, PgBuyersService, data::NewBuyer,
            records::{BuyerRole, BuyerUuid}},
        carts::service::PgCartsService,
        notifications::{NotificationDispatcher, TracingDispatcher},
        orders::service::PgOrdersService,
        payments::{gateway::PaymentGateway, service::PgPaymentsService},
        products::PgProductsService,
        tenants::{PgTenantsService, TenantsService, data::NewTenant, records::TenantUuid},
    },
};

use super::db::TestDb;

/// Name of the non-superuser app role used for RLS testing.
const APP_ROLE: &str = "souk_app_test";
const APP_ROLE_PASSWORD: &str = "souk_app_test_pass";

pub struct TestContext {
    pub db: TestDb,

    /// Pool connected as the restricted app role, so row-level security is
    /// actually enforced in tests.
    pub app_db: Db,

    pub tenant_uuid: TenantUuid,
    pub buyers: PgBuyersService,
    pub products: PgProductsService,
    pub carts: PgCartsService,
    pub orders: PgOrdersService,
}

impl TestContext {
    pub async fn new() -> Self {
        let test_db = TestDb::new().await;

        // Build a non-superuser app pool so RLS policies are enforced. The
        // superuser pool is only used for administrative setup.
        let app_pool = Self::setup_app_pool(&test_db).await;
        let app_db = Db::new(app_pool);

        let tenant_uuid = TenantUuid::new();

        PgTenantsService::new(test_db.pool().clone())
            .create_tenant(NewTenant {
                uuid: tenant_uuid,
                name: "Test Tenant".to_string(),
            })
            .await
            .expect("Failed to create default test tenant");

        let dispatcher: Arc<dyn NotificationDispatcher> = Arc::new(TracingDispatcher);

        Self {
            buyers: PgBuyersService::new(app_db.clone()),
            products: PgProductsService::new(app_db.clone()),
            carts: PgCartsService::new(app_db.clone()),
            orders: PgOrdersService::new(app_db.clone(), dispatcher),
            tenant_uuid,
            app_db,
            db: test_db,
        }
    }

    /// Create an additional tenant, useful for RLS isolation tests.
    pub async fn create_tenant(&self, name: &str) -> TenantUuid {
        let uuid = TenantUuid::new();

        PgTenantsService::new(self.db.pool().clone())
            .create_tenant(NewTenant {
                uuid,
                name: name.to_string(),
            })
            .await
            .expect("Failed to create test tenant");

        uuid
    }

    /// Create a buyer with the given role in the default tenant.
    pub async fn create_buyer(&self, role: BuyerRole) -> Result<BuyerUuid, BuyersServiceError> {
        let uuid = BuyerUuid::new();

        self.buyers
            .create_buyer(
                self.tenant_uuid,
                NewBuyer {
                    uuid,
                    name: "Test Buyer".to_string(),
                    role,
                },
            )
            .await?;

        Ok(uuid)
    }

    /// Build a payments service around the given gateway and dispatcher,
    /// usually mocks.
    pub fn payments(
        &self,
        gateway: Arc<dyn PaymentGateway>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> PgPaymentsService {
        PgPaymentsService::new(self.app_db.clone(), gateway, dispatcher)
    }

    /// Create a non-superuser role (once per server) and return a pool
    /// connected as it.
    ///
    /// PostgreSQL superusers bypass RLS even with `FORCE ROW LEVEL SECURITY`,
    /// so service tests that exercise isolation must connect via this
    /// restricted role.
    async fn setup_app_pool(test_db: &TestDb) -> PgPool {
        let su_url = &test_db.superuser_url;

        // CREATE ROLE is server-scoped, so it runs against the maintenance
        // database rather than the per-test one.
        let postgres_url = su_url.rsplit_once('/').map(|x| x.0).unwrap_or(su_url);
        let postgres_url = format!("{postgres_url}/postgres");

        let mut server_conn = PgConnection::connect(&postgres_url)
            .await
            .expect("Failed to connect to postgres database for role setup");

        // Multiple parallel tests may race here; "role already exists"
        // (42710) or the underlying unique violation (23505) both mean the
        // role is present.
        let create_result = query(&format!(
            "CREATE ROLE {APP_ROLE} WITH LOGIN PASSWORD '{APP_ROLE_PASSWORD}' \
               NOSUPERUSER NOCREATEDB NOCREATEROLE"
        ))
        .execute(&mut server_conn)
        .await;

        if let Err(sqlx::Error::Database(ref e)) = create_result {
            if !matches!(e.code().as_deref(), Some("42710") | Some("23505")) {
                create_result.expect("Failed to create app role");
            }
        } else {
            create_result.expect("Failed to create app role");
        }

        query(&format!(
            "GRANT CONNECT ON DATABASE \"{}\" TO {APP_ROLE}",
            test_db.name
        ))
        .execute(&mut server_conn)
        .await
        .expect("Failed to grant CONNECT on test database");

        server_conn
            .close()
            .await
            .expect("Failed to close server connection");

        let mut db_conn = PgConnection::connect(su_url)
            .await
            .expect("Failed to connect to test database for privilege setup");

        for stmt in [
            format!("GRANT USAGE ON SCHEMA public TO {APP_ROLE}"),
            format!(
                "GRANT SELECT, INSERT, UPDATE, DELETE ON ALL TABLES IN SCHEMA public TO {APP_ROLE}"
            ),
            format!("GRANT USAGE, SELECT ON ALL SEQUENCES IN SCHEMA public TO {APP_ROLE}"),
        ] {
            query(&stmt)
                .execute(&mut db_conn)
                .await
                .expect("Failed to grant table privileges to app role");
        }

        db_conn
            .close()
            .await
            .expect("Failed to close db connection");

        let app_url = su_url.replacen(
            "souk_test:souk_test_password",
            &format!("{APP_ROLE}:{APP_ROLE_PASSWORD}"),
            1,
        );

        PgPool::connect(&app_url)
            .await
            .expect("Failed to create app pool")
    }
}
