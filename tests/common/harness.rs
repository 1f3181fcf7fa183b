//! Test harness backed by a shared, once-started Postgres container.
//!
//! The container and migrations are set up once for the whole test binary
//! and reused; each test gets its own connection pool and its own rows
//! (there is no per-test schema reset — fixtures create fresh users/jobs
//! with their own identities, so tests don't need to see an empty table).

use anyhow::{Context, Result};
use sqlx::PgPool;
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

use cronmaster::common::entity_ids::UserId;

struct SharedPostgres {
    db_url: String,
    _container: ContainerAsync<Postgres>,
}

static SHARED: OnceCell<SharedPostgres> = OnceCell::const_new();

impl SharedPostgres {
    async fn init() -> Result<Self> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let container = Postgres::default().start().await.context("failed to start postgres container")?;

        let host = container.get_host().await?;
        let port = container.get_host_port_ipv4(5432).await?;
        let db_url = format!("postgresql://postgres:postgres@{host}:{port}/postgres");

        let pool = PgPool::connect(&db_url).await.context("failed to connect for migrations")?;
        sqlx::migrate!("./migrations").run(&pool).await.context("failed to run migrations")?;

        Ok(Self {
            db_url,
            _container: container,
        })
    }

    async fn get() -> &'static Self {
        SHARED.get_or_init(|| async { Self::init().await.expect("failed to start shared postgres") }).await
    }
}

pub struct TestHarness {
    pub db_pool: PgPool,
}

impl TestHarness {
    pub async fn new() -> Result<Self> {
        let shared = SharedPostgres::get().await;
        let db_pool = PgPool::connect(&shared.db_url).await.context("failed to connect test pool")?;
        Ok(Self { db_pool })
    }

    /// Insert a fresh user row and return its id. Email is randomized by
    /// the caller-supplied label to avoid the unique constraint colliding
    /// across tests sharing one database.
    pub async fn create_user(&self, label: &str) -> UserId {
        let row: (UserId,) = sqlx::query_as(
            "INSERT INTO users (name, email, password_hash) VALUES ($1, $2, 'not-a-real-hash') RETURNING id",
        )
        .bind(format!("Test User {label}"))
        .bind(format!("{label}@example.test"))
        .fetch_one(&self.db_pool)
        .await
        .expect("failed to insert test user");

        row.0
    }
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::new().await.expect("failed to create test harness")
    }

    async fn teardown(self) {
        self.db_pool.close().await;
    }
}
