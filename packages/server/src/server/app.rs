//! Application setup and server configuration.

use std::sync::Arc;

use axum::Router;
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::domains::transfer;
use crate::domains::transfer::{JobOrchestrator, TransferWorker};
use crate::kernel::jobs::store::{PostgresStateStore, StateStore};
use crate::server::routes;

/// Shared application state, cloned into every request.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub store: Arc<dyn StateStore>,
    pub worker: Arc<TransferWorker>,
    pub orchestrator: Arc<JobOrchestrator>,
}

pub fn build_app(pool: PgPool, config: &Config) -> Router {
    let store: Arc<dyn StateStore> = Arc::new(PostgresStateStore::new(pool.clone()));
    let worker = transfer::worker(&pool, config);
    let orchestrator = Arc::new(transfer::orchestrator(&pool, config));

    let state = AppState {
        db_pool: pool,
        store,
        worker,
        orchestrator,
    };

    let cors = CorsLayer::permissive();

    Router::new()
        .merge(routes::router())
        .layer(axum::Extension(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
