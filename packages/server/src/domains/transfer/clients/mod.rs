//! Vendor collaborator contracts. The core (StateStore, worker, orchestrator)
//! depends only on these traits; `coros` and `garmin` are the bundled
//! concrete implementations (see SPEC_FULL §10.4).

pub mod coros;
pub mod garmin;

use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;

use crate::common::error::TransferError;

/// A vendor activity as enumerated by `list_activities`. Only the fields the
/// pipeline actually consumes are modeled; everything else the vendor's wire
/// format carries is dropped at the boundary.
#[derive(Debug, Clone, Deserialize)]
pub struct Activity {
    pub source_id: String,
    pub sport_code: i32,
    pub name: Option<String>,
    /// Opaque vendor-native start time string (epoch seconds/millis or a
    /// vendor-formatted string); only `DuplicateProbe` parses it.
    pub start_time: Option<String>,
}

/// Result of `SinkClient::upload_fit`, mirroring the three outcomes the
/// original vendor API distinguishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The sink assigned this id to the new activity.
    Created(String),
    /// The sink's explicit duplicate-detection signal fired.
    Duplicate,
    /// The upload response had neither successes nor failures listed;
    /// triggers `DuplicateProbe`.
    Ambiguous,
}

#[async_trait]
pub trait SourceClient: Send + Sync {
    async fn login(&mut self, email: &str, password: &str) -> Result<bool, TransferError>;

    async fn list_activities(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
        sport_filter: &[i32],
    ) -> Result<Vec<Activity>, TransferError>;

    /// Downloads the activity file to `save_path`, applying any required
    /// format-specific payload fix. Returns `Ok(false)` (not an error) when
    /// the vendor has no file for this activity.
    async fn download(
        &self,
        source_id: &str,
        sport_code: i32,
        format: &str,
        save_path: &Path,
    ) -> Result<bool, TransferError>;
}

#[async_trait]
pub trait SinkClient: Send + Sync {
    async fn login(&mut self, email: &str, password: &str) -> Result<bool, TransferError>;

    async fn upload_fit(
        &self,
        path: &Path,
        name: Option<&str>,
        start_time: Option<&str>,
    ) -> Result<UploadOutcome, TransferError>;

    async fn list_activities(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Activity>, TransferError>;

    async fn set_activity_name(&self, sink_id: &str, name: &str) -> Result<(), TransferError>;
    async fn set_privacy(&self, sink_id: &str, visibility: &str) -> Result<(), TransferError>;
    async fn link_gear(&self, sink_id: &str, gear_id: &str) -> Result<(), TransferError>;
}
