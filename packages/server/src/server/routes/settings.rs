use std::collections::HashMap;

use axum::extract::Extension;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::common::error::TransferError;
use crate::domains::transfer::clients::Activity;
use crate::domains::transfer::settings_service::SettingsPatch;
use crate::kernel::jobs::settings::Settings;
use crate::server::app::AppState;

pub async fn get_settings(
    Extension(state): Extension<AppState>,
) -> Result<Json<Settings>, TransferError> {
    let settings = state.orchestrator.settings_service().get_settings().await?;
    Ok(Json(settings))
}

#[derive(Debug, Deserialize)]
pub struct PutSettingsRequest {
    pub settings: SettingsPatch,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum PutSettingsResponse {
    Ok(Settings),
    ValidationError {
        error: &'static str,
        fields: HashMap<String, String>,
    },
}

pub async fn put_settings(
    Extension(state): Extension<AppState>,
    Json(body): Json<PutSettingsRequest>,
) -> Result<(StatusCode, Json<PutSettingsResponse>), TransferError> {
    let (settings, errors) = state
        .orchestrator
        .settings_service()
        .save_settings(body.settings)
        .await?;

    if errors.is_empty() {
        Ok((StatusCode::OK, Json(PutSettingsResponse::Ok(settings))))
    } else {
        Ok((
            StatusCode::BAD_REQUEST,
            Json(PutSettingsResponse::ValidationError {
                error: "validation_error",
                fields: errors,
            }),
        ))
    }
}

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub activity: Activity,
    pub settings: Option<Settings>,
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub title: String,
    pub description: String,
    pub patch: serde_json::Value,
}

pub async fn preview(
    Extension(state): Extension<AppState>,
    Json(body): Json<PreviewRequest>,
) -> Result<Json<PreviewResponse>, TransferError> {
    let settings_service = state.orchestrator.settings_service();
    let settings = match body.settings {
        Some(s) => s,
        None => settings_service.get_settings().await?,
    };

    let preview = settings_service.preview(&body.activity, &settings);
    Ok(Json(PreviewResponse {
        title: preview.title,
        description: preview.description,
        patch: preview.patch,
    }))
}
