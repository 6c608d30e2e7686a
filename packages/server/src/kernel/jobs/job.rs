//! The `Job` row: a unit of work covering a half-open source date range.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::common::id::Id;

/// Marker type for `Id<JobMarker>` - see `common::id`.
pub struct JobMarker;
pub type JobId = Id<JobMarker>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transfer_job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// Aggregate item-status counts maintained on the job row. Always recomputed
/// from child items (`StateStore::recompute_counts`), never incremented in place.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct JobCounts {
    pub total: i64,
    pub completed: i64,
    pub success: i64,
    pub skipped: i64,
    pub failed: i64,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Job {
    #[builder(default = JobId::new())]
    pub id: JobId,

    #[builder(default = JobStatus::Pending)]
    pub status: JobStatus,

    pub start_date: NaiveDate,
    pub end_date: NaiveDate,

    /// Vendor sport codes to include; empty means "all sports".
    #[builder(default)]
    pub sport_filter: Vec<i32>,

    /// Deep, immutable copy of the effective Settings document at job creation.
    pub settings_snapshot: serde_json::Value,

    #[builder(default)]
    pub total: i64,
    #[builder(default)]
    pub completed: i64,
    #[builder(default)]
    pub success: i64,
    #[builder(default)]
    pub skipped: i64,
    #[builder(default)]
    pub failed: i64,

    #[builder(default, setter(strip_option))]
    pub error_message: Option<String>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default, setter(strip_option))]
    pub started_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn counts(&self) -> JobCounts {
        JobCounts {
            total: self.total,
            completed: self.completed,
            success: self.success,
            skipped: self.skipped,
            failed: self.failed,
        }
    }

    /// An item status is "pending-like" if it has not yet reached a terminal
    /// disposition (success/skipped/failed) - i.e. it still counts against
    /// `total` but not yet against `completed`.
    pub fn pending_like(&self) -> i64 {
        self.total - self.completed
    }
}

#[allow(dead_code)]
fn assert_job_id_is_uuid_wrapper(id: JobId) -> Uuid {
    id.into_uuid()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job() -> Job {
        Job::builder()
            .start_date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
            .end_date(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap())
            .settings_snapshot(serde_json::json!({}))
            .build()
    }

    #[test]
    fn new_job_starts_pending() {
        let job = sample_job();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.started_at.is_none());
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn new_job_has_zero_counts() {
        let job = sample_job();
        assert_eq!(job.total, 0);
        assert_eq!(job.pending_like(), 0);
    }

    #[test]
    fn terminal_statuses_are_terminal() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Paused.is_terminal());
    }

    #[test]
    fn pending_like_reflects_incomplete_items() {
        let mut job = sample_job();
        job.total = 10;
        job.completed = 4;
        assert_eq!(job.pending_like(), 6);
    }
}
