//! The transfer pipeline: moves recorded activities from COROS to Garmin
//! Connect China. `worker` and `orchestrator` are the two entry points the
//! HTTP layer drives; everything else here is their shared plumbing.

pub mod clients;
pub mod duplicate_probe;
pub mod orchestrator;
pub mod payload_fixer;
pub mod retry;
pub mod settings_service;
pub mod sport_codes;
pub mod template;
pub mod worker;

pub use duplicate_probe::{DuplicateProbe, DuplicateProbeConfig};
pub use orchestrator::JobOrchestrator;
pub use settings_service::SettingsService;
pub use worker::{TransferWorker, WorkerDeps};

use std::sync::{Arc, OnceLock};

use sqlx::PgPool;

use crate::config::Config;
use crate::kernel::jobs::store::{PostgresStateStore, StateStore};
use crate::kernel::secrets::SecretStore;

static WORKER: OnceLock<Arc<TransferWorker>> = OnceLock::new();

/// The process-wide worker instance. Built once from `pool`/`config` on
/// first access; later calls ignore their arguments and return the existing
/// instance (mirrors the original single-process global worker).
pub fn worker(pool: &PgPool, config: &Config) -> Arc<TransferWorker> {
    WORKER
        .get_or_init(|| Arc::new(build_worker(pool.clone(), config)))
        .clone()
}

fn build_worker(pool: PgPool, config: &Config) -> TransferWorker {
    let store: Arc<dyn StateStore> = Arc::new(PostgresStateStore::new(pool.clone()));
    let secrets = Arc::new(
        SecretStore::new(pool.clone(), &config.encryption_key).expect("invalid ENCRYPTION_KEY"),
    );
    let settings_service = Arc::new(SettingsService::new(pool));
    let duplicate_probe = DuplicateProbe::new(DuplicateProbeConfig {
        window_seconds: config.duplicate_confirm_window_seconds,
        search_days: config.duplicate_confirm_search_days,
    });

    TransferWorker::new(WorkerDeps {
        store,
        secrets,
        settings_service,
        downloads_dir: config.downloads_dir.clone(),
        duplicate_probe,
    })
}

pub fn orchestrator(pool: &PgPool, config: &Config) -> JobOrchestrator {
    let store: Arc<dyn StateStore> = Arc::new(PostgresStateStore::new(pool.clone()));
    let secrets = Arc::new(
        SecretStore::new(pool.clone(), &config.encryption_key).expect("invalid ENCRYPTION_KEY"),
    );
    let settings_service = Arc::new(SettingsService::new(pool.clone()));
    JobOrchestrator::new(store, secrets, settings_service, worker(pool, config))
}
