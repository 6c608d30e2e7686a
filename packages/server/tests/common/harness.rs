//! Test harness with testcontainers for integration testing.
//!
//! A single Postgres container is started and migrated once, then reused by
//! every test in the binary; each test gets its own `PgPool` and builds its
//! own `JobOrchestrator`/`TransferWorker` directly from the public
//! constructors rather than through the process-wide singleton accessor, so
//! tests stay independent of one another without needing a reset hook.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use transfer_core::domains::transfer::{
    DuplicateProbe, DuplicateProbeConfig, JobOrchestrator, TransferWorker, WorkerDeps,
};
use transfer_core::kernel::jobs::store::{PostgresStateStore, StateStore};
use transfer_core::kernel::secrets::SecretStore;

/// All-zero 32-byte AES key, hex-encoded. Fine for tests; never used in prod.
pub const TEST_ENCRYPTION_KEY: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

struct SharedTestInfra {
    db_url: String,
    _postgres: ContainerAsync<Postgres>,
}

static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let postgres = Postgres::default()
            .start()
            .await
            .context("failed to start Postgres container")?;

        let host = postgres.get_host().await?;
        let port = postgres.get_host_port_ipv4(5432).await?;
        let db_url = format!("postgresql://postgres:postgres@{host}:{port}/postgres");

        let pool = PgPool::connect(&db_url)
            .await
            .context("failed to connect to Postgres for migrations")?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run migrations")?;

        Ok(Self {
            db_url,
            _postgres: postgres,
        })
    }

    async fn get() -> &'static Self {
        SHARED_INFRA
            .get_or_init(|| async { Self::init().await.expect("failed to init test infra") })
            .await
    }
}

pub struct TestHarness {
    pub db_pool: PgPool,
    pub store: Arc<dyn StateStore>,
    pub secrets: Arc<SecretStore>,
}

impl TestHarness {
    pub async fn new() -> Result<Self> {
        let infra = SharedTestInfra::get().await;
        let db_pool = PgPool::connect(&infra.db_url)
            .await
            .context("failed to connect to test database")?;

        let store: Arc<dyn StateStore> = Arc::new(PostgresStateStore::new(db_pool.clone()));
        let secrets = Arc::new(SecretStore::new(db_pool.clone(), TEST_ENCRYPTION_KEY)?);

        Ok(Self {
            db_pool,
            store,
            secrets,
        })
    }

    /// Builds an orchestrator paired with `worker`: the same pairing
    /// `app.rs`/`mod.rs` construct in production, so `cancel_job`'s signal
    /// to the worker actually reaches the instance under test.
    pub fn orchestrator(&self, worker: Arc<TransferWorker>) -> JobOrchestrator {
        JobOrchestrator::new(
            self.store.clone(),
            self.secrets.clone(),
            Arc::new(transfer_core::domains::transfer::SettingsService::new(
                self.db_pool.clone(),
            )),
            worker,
        )
    }

    pub fn worker(&self, downloads_dir: PathBuf) -> Arc<TransferWorker> {
        Arc::new(TransferWorker::new(WorkerDeps {
            store: self.store.clone(),
            secrets: self.secrets.clone(),
            settings_service: Arc::new(transfer_core::domains::transfer::SettingsService::new(
                self.db_pool.clone(),
            )),
            downloads_dir,
            duplicate_probe: DuplicateProbe::new(DuplicateProbeConfig {
                window_seconds: 120,
                search_days: 2,
            }),
        }))
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
