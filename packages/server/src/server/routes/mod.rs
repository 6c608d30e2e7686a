// HTTP routes
pub mod health;
pub mod jobs;
pub mod settings;
pub mod worker;

use axum::routing::{get, post};
use axum::Router;

pub use health::*;

/// Assembles the full route table. Handlers read shared state via
/// `Extension<AppState>` rather than `Router<AppState>`, so this returns a
/// plain `Router` the caller layers `Extension` onto.
pub fn router() -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/jobs", post(jobs::create_job).get(jobs::list_jobs))
        .route("/jobs/:id", get(jobs::get_job).delete(jobs::delete_job))
        .route("/jobs/:id/start", post(jobs::start_job))
        .route("/jobs/:id/cancel", post(jobs::cancel_job))
        .route("/jobs/:id/rerun-metadata", post(jobs::rerun_metadata))
        .route("/worker/status", get(worker::status))
        .route("/worker/pause", post(worker::pause))
        .route("/worker/resume", post(worker::resume))
        .route("/worker/stop", post(worker::stop))
        .route(
            "/settings/transfer",
            get(settings::get_settings).put(settings::put_settings),
        )
        .route("/settings/transfer/preview", post(settings::preview))
}
