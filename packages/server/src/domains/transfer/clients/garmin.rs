//! Garmin Connect China sink client. One instance per worker task, mirroring
//! `CorosClient`: the session cookie jar is not safe to share across
//! concurrently running uploads.

use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::common::error::TransferError;
use crate::domains::transfer::clients::{Activity, SinkClient, UploadOutcome};

const BASE_URL: &str = "https://connectapi.garmin.cn";
const PAGE_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(rename = "detailedImportResult")]
    detailed_import_result: DetailedImportResult,
}

#[derive(Debug, Deserialize)]
struct DetailedImportResult {
    #[serde(default)]
    successes: Vec<ImportEntry>,
    #[serde(default)]
    failures: Vec<ImportEntry>,
}

#[derive(Debug, Deserialize)]
struct ImportEntry {
    #[serde(rename = "internalId")]
    internal_id: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawActivity {
    #[serde(rename = "activityId")]
    activity_id: serde_json::Value,
    #[serde(rename = "activityType")]
    activity_type: Option<ActivityType>,
    #[serde(rename = "activityName")]
    activity_name: Option<String>,
    #[serde(rename = "startTimeLocal")]
    start_time_local: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ActivityType {
    #[serde(rename = "typeId")]
    type_id: Option<i32>,
}

pub struct GarminClient {
    http: Client,
    authenticated: bool,
}

impl GarminClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
            authenticated: false,
        }
    }

    fn require_authenticated(&self) -> Result<(), TransferError> {
        if !self.authenticated {
            return Err(TransferError::Auth("garmin client is not logged in".to_string()));
        }
        Ok(())
    }
}

impl Default for GarminClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SinkClient for GarminClient {
    async fn login(&mut self, email: &str, password: &str) -> Result<bool, TransferError> {
        let response = self
            .http
            .post(format!("{BASE_URL}/auth/login"))
            .json(&json!({ "username": email, "password": password }))
            .send()
            .await
            .map_err(|e| TransferError::TransientIO(e.to_string()))?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "garmin login rejected");
            return Ok(false);
        }

        self.authenticated = true;
        info!("garmin login succeeded");
        Ok(true)
    }

    async fn upload_fit(
        &self,
        path: &Path,
        _name: Option<&str>,
        _start_time: Option<&str>,
    ) -> Result<UploadOutcome, TransferError> {
        self.require_authenticated()?;

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| TransferError::TransientIO(e.to_string()))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("activity.fit")
            .to_string();
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new().part("file", part);

        let response: UploadResponse = self
            .http
            .post(format!("{BASE_URL}/upload-service/upload"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| TransferError::TransientIO(e.to_string()))?
            .json()
            .await
            .map_err(|e| TransferError::TransientIO(e.to_string()))?;

        let result = response.detailed_import_result;
        if let Some(entry) = result.successes.first() {
            let id = entry
                .internal_id
                .as_ref()
                .map(|v| v.to_string().trim_matches('"').to_string())
                .unwrap_or_default();
            return Ok(UploadOutcome::Created(id));
        }
        if !result.failures.is_empty() {
            return Ok(UploadOutcome::Duplicate);
        }
        Ok(UploadOutcome::Ambiguous)
    }

    async fn list_activities(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Activity>, TransferError> {
        self.require_authenticated()?;

        let mut activities = Vec::new();
        let mut start = 0i64;
        loop {
            let batch: Vec<RawActivity> = self
                .http
                .get(format!("{BASE_URL}/activitylist-service/activities/search/activities"))
                .query(&[
                    ("start", start.to_string()),
                    ("limit", PAGE_LIMIT.to_string()),
                    ("startDate", start_date.format("%Y-%m-%d").to_string()),
                    ("endDate", end_date.format("%Y-%m-%d").to_string()),
                ])
                .send()
                .await
                .map_err(|e| TransferError::TransientIO(e.to_string()))?
                .json()
                .await
                .map_err(|e| TransferError::TransientIO(e.to_string()))?;

            if batch.is_empty() {
                break;
            }
            let batch_len = batch.len();
            for raw in batch {
                activities.push(Activity {
                    source_id: raw.activity_id.to_string().trim_matches('"').to_string(),
                    sport_code: raw.activity_type.and_then(|t| t.type_id).unwrap_or(0),
                    name: raw.activity_name,
                    start_time: raw.start_time_local,
                });
            }
            start += PAGE_LIMIT;
            if (batch_len as i64) < PAGE_LIMIT {
                break;
            }
        }

        Ok(activities)
    }

    async fn set_activity_name(&self, sink_id: &str, name: &str) -> Result<(), TransferError> {
        self.require_authenticated()?;
        self.http
            .put(format!("{BASE_URL}/activity-service/activity/{sink_id}"))
            .json(&json!({ "activityId": sink_id, "activityName": name }))
            .send()
            .await
            .map_err(|e| TransferError::Metadata(e.to_string()))?
            .error_for_status()
            .map_err(|e| TransferError::Metadata(e.to_string()))?;
        Ok(())
    }

    async fn set_privacy(&self, sink_id: &str, visibility: &str) -> Result<(), TransferError> {
        self.require_authenticated()?;
        let type_key = match visibility {
            "private" => "private",
            "public" => "public",
            other => {
                return Err(TransferError::Validation(format!(
                    "unsupported privacy visibility '{other}'"
                )))
            }
        };
        self.http
            .put(format!("{BASE_URL}/activity-service/activity/{sink_id}"))
            .json(&json!({ "activityId": sink_id, "privacy": { "typeKey": type_key } }))
            .send()
            .await
            .map_err(|e| TransferError::Metadata(e.to_string()))?
            .error_for_status()
            .map_err(|e| TransferError::Metadata(e.to_string()))?;
        Ok(())
    }

    async fn link_gear(&self, sink_id: &str, gear_id: &str) -> Result<(), TransferError> {
        self.require_authenticated()?;
        self.http
            .put(format!("{BASE_URL}/gear-service/gear/link/{gear_id}/activity/{sink_id}"))
            .send()
            .await
            .map_err(|e| TransferError::Metadata(e.to_string()))?
            .error_for_status()
            .map_err(|e| TransferError::Metadata(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthenticated_client_rejects_requests() {
        let client = GarminClient::new();
        assert!(client.require_authenticated().is_err());
    }
}
