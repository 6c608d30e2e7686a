//! The `Item` row: a single activity-transfer attempt belonging to one Job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::common::id::Id;
use crate::kernel::jobs::job::JobId;

pub struct ItemMarker;
pub type ItemId = Id<ItemMarker>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transfer_item_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Downloading,
    Uploading,
    Success,
    Skipped,
    Failed,
}

impl ItemStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ItemStatus::Success | ItemStatus::Skipped | ItemStatus::Failed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transfer_metadata_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MetadataStatus {
    Pending,
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Item {
    #[builder(default = ItemId::new())]
    pub id: ItemId,

    pub job_id: JobId,

    /// Opaque source-platform activity handle (e.g. COROS `labelId`).
    pub source_id: String,

    pub sport_code: i32,

    #[builder(default, setter(strip_option))]
    pub activity_name: Option<String>,

    /// Opaque source-provided start time; only parsed by `DuplicateProbe`.
    #[builder(default, setter(strip_option))]
    pub activity_time: Option<String>,

    #[builder(default = ItemStatus::Pending)]
    pub status: ItemStatus,

    #[builder(default)]
    pub retry_count: i32,

    #[builder(default, setter(strip_option))]
    pub local_path: Option<String>,

    #[builder(default, setter(strip_option))]
    pub sink_id: Option<String>,

    #[builder(default, setter(strip_option))]
    pub error_message: Option<String>,

    #[builder(default = MetadataStatus::Pending)]
    pub metadata_status: MetadataStatus,

    #[builder(default, setter(strip_option))]
    pub metadata_error: Option<String>,

    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

/// Partial update applied by `StateStore::update_item`; unset fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ItemPatch {
    pub status: Option<ItemStatus>,
    pub error_message: Option<Option<String>>,
    pub sink_id: Option<Option<String>>,
    pub local_path: Option<Option<String>>,
    pub metadata_status: Option<MetadataStatus>,
    pub metadata_error: Option<Option<String>>,
}

impl ItemPatch {
    pub fn status(mut self, status: ItemStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn error_message(mut self, msg: impl Into<String>) -> Self {
        self.error_message = Some(Some(msg.into()));
        self
    }

    pub fn sink_id(mut self, id: impl Into<String>) -> Self {
        self.sink_id = Some(Some(id.into()));
        self
    }

    pub fn local_path(mut self, path: impl Into<String>) -> Self {
        self.local_path = Some(Some(path.into()));
        self
    }

    pub fn metadata_status(mut self, status: MetadataStatus) -> Self {
        self.metadata_status = Some(status);
        self
    }

    pub fn metadata_error(mut self, msg: impl Into<String>) -> Self {
        self.metadata_error = Some(Some(msg.into()));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_item() -> Item {
        Item::builder()
            .job_id(JobId::new())
            .source_id("abc123")
            .sport_code(100)
            .build()
    }

    #[test]
    fn new_item_starts_pending_with_zero_retries() {
        let item = sample_item();
        assert_eq!(item.status, ItemStatus::Pending);
        assert_eq!(item.retry_count, 0);
        assert_eq!(item.metadata_status, MetadataStatus::Pending);
        assert!(item.sink_id.is_none());
    }

    #[test]
    fn terminal_item_statuses() {
        assert!(ItemStatus::Success.is_terminal());
        assert!(ItemStatus::Skipped.is_terminal());
        assert!(ItemStatus::Failed.is_terminal());
        assert!(!ItemStatus::Pending.is_terminal());
        assert!(!ItemStatus::Downloading.is_terminal());
        assert!(!ItemStatus::Uploading.is_terminal());
    }

    #[test]
    fn patch_builder_sets_only_requested_fields() {
        let patch = ItemPatch::default()
            .status(ItemStatus::Success)
            .sink_id("G1");
        assert_eq!(patch.status, Some(ItemStatus::Success));
        assert_eq!(patch.sink_id, Some(Some("G1".to_string())));
        assert!(patch.metadata_status.is_none());
        assert!(patch.local_path.is_none());
    }
}
