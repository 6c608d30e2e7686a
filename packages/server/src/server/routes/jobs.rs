use axum::extract::{Extension, Path, Query};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::common::error::TransferError;
use crate::kernel::jobs::item::{Item, ItemStatus};
use crate::kernel::jobs::job::{Job, JobId};
use crate::server::app::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub sport_types: Vec<i32>,
}

#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    pub id: JobId,
}

pub async fn create_job(
    Extension(state): Extension<AppState>,
    Json(body): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<CreateJobResponse>), TransferError> {
    let id = state
        .orchestrator
        .create_job(body.start_date, body.end_date, body.sport_types)
        .await?;
    Ok((StatusCode::CREATED, Json(CreateJobResponse { id })))
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

pub async fn list_jobs(
    Extension(state): Extension<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<Vec<Job>>, TransferError> {
    let jobs = state.store.list_jobs(query.limit, 0).await?;
    Ok(Json(jobs))
}

#[derive(Debug, Deserialize)]
pub struct GetJobQuery {
    pub status: Option<ItemStatus>,
    pub items_limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct GetJobResponse {
    #[serde(flatten)]
    pub job: Job,
    pub items: Vec<Item>,
}

pub async fn get_job(
    Extension(state): Extension<AppState>,
    Path(id): Path<JobId>,
    Query(query): Query<GetJobQuery>,
) -> Result<Json<GetJobResponse>, TransferError> {
    let job = state
        .store
        .get_job(id)
        .await?
        .ok_or_else(|| TransferError::NotFound(format!("job {id}")))?;

    let mut items = state.store.list_items(id).await?;
    if let Some(status) = query.status {
        items.retain(|i| i.status == status);
    }
    if let Some(limit) = query.items_limit {
        items.truncate(limit);
    }

    Ok(Json(GetJobResponse { job, items }))
}

/// Runs the job immediately, bypassing the worker's poll loop. Spawned in
/// the background since a transfer can take far longer than an HTTP
/// request is willing to wait.
pub async fn start_job(
    Extension(state): Extension<AppState>,
    Path(id): Path<JobId>,
) -> StatusCode {
    let worker = state.worker.clone();
    tokio::spawn(async move {
        if let Err(e) = worker.process_job(id).await {
            error!(job_id = %id, error = %e, "triggered job run failed");
        }
    });
    StatusCode::ACCEPTED
}

pub async fn cancel_job(
    Extension(state): Extension<AppState>,
    Path(id): Path<JobId>,
) -> Result<StatusCode, TransferError> {
    state.orchestrator.cancel_job(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_job(
    Extension(state): Extension<AppState>,
    Path(id): Path<JobId>,
) -> Result<StatusCode, TransferError> {
    state.orchestrator.delete_job(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn rerun_metadata(
    Extension(state): Extension<AppState>,
    Path(id): Path<JobId>,
) -> StatusCode {
    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        if let Err(e) = orchestrator.rerun_metadata(id).await {
            error!(job_id = %id, error = %e, "metadata rerun failed");
        }
    });
    StatusCode::ACCEPTED
}
