//! COROS source client. One instance per worker task: the underlying HTTP
//! client carries a session-scoped auth token that must not be shared
//! across concurrent downloads.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;
use lazy_static::lazy_static;
use md5::{Digest, Md5};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::common::error::TransferError;
use crate::domains::transfer::clients::{Activity, SourceClient};
use crate::domains::transfer::payload_fixer::fix_tcx_extensions;

const BASE_URL: &str = "https://teamapi.coros.com";
const PAGE_SIZE: i32 = 20;
const INTER_PAGE_DELAY_MS: u64 = 1000;

lazy_static! {
    static ref FILE_TYPE_CODES: HashMap<&'static str, i32> =
        HashMap::from([("gpx", 1), ("fit", 4), ("tcx", 3)]);
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    result: String,
    data: Option<LoginData>,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    #[serde(rename = "accessToken")]
    access_token: String,
    #[serde(rename = "userId")]
    #[allow(dead_code)]
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct ActivityPage {
    result: String,
    data: Option<ActivityPageData>,
}

#[derive(Debug, Deserialize)]
struct ActivityPageData {
    #[serde(default)]
    #[serde(rename = "dataList")]
    data_list: Vec<RawActivity>,
}

#[derive(Debug, Deserialize)]
struct RawActivity {
    #[serde(rename = "labelId")]
    label_id: String,
    #[serde(rename = "sportType")]
    sport_type: i32,
    name: Option<String>,
    #[serde(rename = "startTime")]
    start_time: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct DownloadResponse {
    result: String,
    data: Option<DownloadData>,
}

#[derive(Debug, Deserialize)]
struct DownloadData {
    #[serde(rename = "fileUrl")]
    file_url: String,
}

pub struct CorosClient {
    http: Client,
    access_token: Option<String>,
}

impl CorosClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
            access_token: None,
        }
    }

    fn hash_password(password: &str) -> String {
        let mut hasher = Md5::new();
        hasher.update(password.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn auth_header(&self) -> Result<&str, TransferError> {
        self.access_token
            .as_deref()
            .ok_or_else(|| TransferError::Auth("coros client is not logged in".to_string()))
    }
}

impl Default for CorosClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceClient for CorosClient {
    async fn login(&mut self, email: &str, password: &str) -> Result<bool, TransferError> {
        let hashed = Self::hash_password(password);
        let response: LoginResponse = self
            .http
            .post(format!("{BASE_URL}/account/login"))
            .json(&json!({ "account": email, "accountType": 2, "pwd": hashed }))
            .send()
            .await
            .map_err(|e| TransferError::TransientIO(e.to_string()))?
            .json()
            .await
            .map_err(|e| TransferError::TransientIO(e.to_string()))?;

        if response.result != "0000" {
            warn!(result = %response.result, "coros login rejected");
            return Ok(false);
        }

        let Some(data) = response.data else {
            return Ok(false);
        };
        self.access_token = Some(data.access_token);
        info!("coros login succeeded");
        Ok(true)
    }

    async fn list_activities(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
        sport_filter: &[i32],
    ) -> Result<Vec<Activity>, TransferError> {
        let token = self.auth_header()?;
        let mode_list = sport_filter
            .iter()
            .map(i32::to_string)
            .collect::<Vec<_>>()
            .join(",");

        let mut activities = Vec::new();
        let mut page_number = 1;
        loop {
            let response: ActivityPage = self
                .http
                .get(format!("{BASE_URL}/activity/query"))
                .header("accesstoken", token)
                .query(&[
                    ("pageNumber", page_number.to_string()),
                    ("size", PAGE_SIZE.to_string()),
                    ("startDay", start_date.format("%Y%m%d").to_string()),
                    ("endDay", end_date.format("%Y%m%d").to_string()),
                    ("modeList", mode_list.clone()),
                ])
                .send()
                .await
                .map_err(|e| TransferError::TransientIO(e.to_string()))?
                .json()
                .await
                .map_err(|e| TransferError::TransientIO(e.to_string()))?;

            if response.result != "0000" {
                warn!(result = %response.result, "coros activity query rejected");
                break;
            }
            let Some(data) = response.data else { break };
            let page_len = data.data_list.len();
            for raw in data.data_list {
                activities.push(Activity {
                    source_id: raw.label_id,
                    sport_code: raw.sport_type,
                    name: raw.name,
                    start_time: raw.start_time.map(|v| match v {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    }),
                });
            }

            if page_len < PAGE_SIZE as usize {
                break;
            }
            page_number += 1;
            tokio::time::sleep(std::time::Duration::from_millis(INTER_PAGE_DELAY_MS)).await;
        }

        Ok(activities)
    }

    async fn download(
        &self,
        source_id: &str,
        sport_code: i32,
        format: &str,
        save_path: &Path,
    ) -> Result<bool, TransferError> {
        let token = self.auth_header()?;
        let file_type = *FILE_TYPE_CODES
            .get(format.to_lowercase().as_str())
            .ok_or_else(|| TransferError::Validation(format!("unsupported download format '{format}'")))?;

        let response: DownloadResponse = self
            .http
            .post(format!("{BASE_URL}/activity/detail/download"))
            .header("accesstoken", token)
            .json(&json!({ "labelId": source_id, "sportType": sport_code, "fileType": file_type }))
            .send()
            .await
            .map_err(|e| TransferError::TransientIO(e.to_string()))?
            .json()
            .await
            .map_err(|e| TransferError::TransientIO(e.to_string()))?;

        if response.result != "0000" {
            return Ok(false);
        }
        let Some(data) = response.data else { return Ok(false) };

        let bytes = self
            .http
            .get(&data.file_url)
            .send()
            .await
            .map_err(|e| TransferError::TransientIO(e.to_string()))?
            .bytes()
            .await
            .map_err(|e| TransferError::TransientIO(e.to_string()))?;

        let content = if format.eq_ignore_ascii_case("tcx") {
            fix_tcx_extensions(&String::from_utf8_lossy(&bytes))
        } else {
            String::from_utf8_lossy(&bytes).into_owned()
        };

        let mut file = tokio::fs::File::create(save_path)
            .await
            .map_err(|e| TransferError::TransientIO(e.to_string()))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| TransferError::TransientIO(e.to_string()))?;

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_password_produces_md5_hex() {
        assert_eq!(CorosClient::hash_password("secret"), "5ebe2294ecd0e0f08eff4d9c7658c5f0");
    }
}
