use std::time::Duration;

use axum::extract::Extension;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::kernel::jobs::job::JobId;
use crate::server::app::AppState;

const STOP_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
pub struct WorkerStatus {
    running: bool,
    paused: bool,
    current_job_id: Option<JobId>,
}

pub async fn status(Extension(state): Extension<AppState>) -> Json<WorkerStatus> {
    Json(WorkerStatus {
        running: state.worker.is_running(),
        paused: state.worker.is_paused(),
        current_job_id: state.worker.current_job().await,
    })
}

pub async fn pause(Extension(state): Extension<AppState>) -> StatusCode {
    state.worker.pause();
    StatusCode::NO_CONTENT
}

pub async fn resume(Extension(state): Extension<AppState>) -> StatusCode {
    state.worker.resume();
    StatusCode::NO_CONTENT
}

pub async fn stop(Extension(state): Extension<AppState>) -> StatusCode {
    state.worker.stop(true, STOP_WAIT_TIMEOUT).await;
    StatusCode::NO_CONTENT
}
