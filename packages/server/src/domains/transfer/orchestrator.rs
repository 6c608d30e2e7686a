//! Job lifecycle: creating a job by enumerating source activities,
//! cancelling, deleting, and re-running just the metadata stage.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;

use crate::common::error::TransferError;
use crate::domains::transfer::clients::coros::CorosClient;
use crate::domains::transfer::clients::garmin::GarminClient;
use crate::domains::transfer::clients::{Activity, SinkClient, SourceClient};
use crate::domains::transfer::settings_service::SettingsService;
use crate::domains::transfer::worker::TransferWorker;
use crate::kernel::jobs::item::{Item, ItemPatch, MetadataStatus};
use crate::kernel::jobs::job::{Job, JobId};
use crate::kernel::jobs::store::StateStore;
use crate::kernel::secrets::SecretStore;

pub struct JobOrchestrator {
    store: Arc<dyn StateStore>,
    secrets: Arc<SecretStore>,
    settings_service: Arc<SettingsService>,
    worker: Arc<TransferWorker>,
}

impl JobOrchestrator {
    pub fn new(
        store: Arc<dyn StateStore>,
        secrets: Arc<SecretStore>,
        settings_service: Arc<SettingsService>,
        worker: Arc<TransferWorker>,
    ) -> Self {
        Self {
            store,
            secrets,
            settings_service,
            worker,
        }
    }

    pub fn settings_service(&self) -> &Arc<SettingsService> {
        &self.settings_service
    }

    /// Enumerates source activities across `[start_date, end_date]` filtered
    /// by `sport_filter` (empty means all sports), snapshots the current
    /// Settings, and persists one Job row with one pending Item per
    /// enumerated activity.
    pub async fn create_job(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
        sport_filter: Vec<i32>,
    ) -> Result<JobId, TransferError> {
        let Some((coros_email, coros_password)) = self.secrets.get("coros").await? else {
            return Err(TransferError::Auth("no coros credentials configured".to_string()));
        };
        let Some((garmin_email, garmin_password)) = self.secrets.get("garmin").await? else {
            return Err(TransferError::Auth("no garmin credentials configured".to_string()));
        };

        let mut source = CorosClient::new();
        if !source.login(&coros_email, &coros_password).await? {
            return Err(TransferError::Auth("coros login failed".to_string()));
        }

        // A job that cannot eventually upload anywhere is useless to create.
        let mut sink = GarminClient::new();
        if !sink.login(&garmin_email, &garmin_password).await? {
            return Err(TransferError::Auth("garmin login failed".to_string()));
        }

        let activities = source
            .list_activities(start_date, end_date, &sport_filter)
            .await?;

        let settings = self.settings_service.get_settings().await?;
        let settings_snapshot = serde_json::to_value(&settings)
            .map_err(|e| TransferError::Validation(format!("settings serialize: {e}")))?;

        let job = Job::builder()
            .start_date(start_date)
            .end_date(end_date)
            .sport_filter(sport_filter)
            .settings_snapshot(settings_snapshot)
            .total(activities.len() as i64)
            .build();

        let items: Vec<Item> = activities
            .into_iter()
            .map(|activity: Activity| {
                Item::builder()
                    .job_id(job.id)
                    .source_id(activity.source_id)
                    .sport_code(activity.sport_code)
                    .maybe_activity_name(activity.name)
                    .maybe_activity_time(activity.start_time)
                    .build()
            })
            .collect();

        info!(job_id = %job.id, item_count = items.len(), "created transfer job");
        self.store.create_job(&job, &items).await?;
        Ok(job.id)
    }

    /// Signals the worker first so an item it already has in flight for
    /// `id` halts before its next stage transition, then sweeps the store.
    /// Signalling before the sweep closes the race where an in-flight item
    /// finishes uploading between the sweep and the worker noticing.
    pub async fn cancel_job(&self, id: JobId) -> Result<(), TransferError> {
        self.worker.signal_job_cancelled(id);
        self.store.cancel_job(id).await
    }

    pub async fn delete_job(&self, id: JobId) -> Result<(), TransferError> {
        self.store.delete_job(id).await
    }

    /// Re-applies the metadata stage (title/privacy/gear) to every item in
    /// `job_id` whose `metadata_status` is `Failed`, without re-downloading
    /// or re-uploading. Uses the job's original `settings_snapshot`, so a
    /// rerun reflects the settings in force when the job was created.
    pub async fn rerun_metadata(&self, job_id: JobId) -> Result<(), TransferError> {
        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| TransferError::NotFound(format!("job {job_id}")))?;
        let settings: crate::kernel::jobs::settings::Settings =
            serde_json::from_value(job.settings_snapshot)
                .map_err(|e| TransferError::Validation(format!("invalid settings snapshot: {e}")))?;

        let Some((garmin_email, garmin_password)) = self.secrets.get("garmin").await? else {
            return Err(TransferError::Auth("no garmin credentials configured".to_string()));
        };
        let mut sink = GarminClient::new();
        if !sink.login(&garmin_email, &garmin_password).await? {
            return Err(TransferError::Auth("garmin login failed".to_string()));
        }

        let items = self.store.list_items(job_id).await?;
        for item in items
            .into_iter()
            .filter(|i| i.metadata_status == MetadataStatus::Failed)
        {
            let Some(sink_id) = item.sink_id.clone() else {
                continue;
            };
            let (status, error) = self.apply_metadata(&sink, &sink_id, &item, &settings).await;
            self.store
                .update_item(
                    item.id,
                    ItemPatch {
                        metadata_status: Some(status),
                        metadata_error: Some(error),
                        ..Default::default()
                    },
                )
                .await?;
        }

        Ok(())
    }

    async fn apply_metadata(
        &self,
        sink: &GarminClient,
        sink_id: &str,
        item: &Item,
        settings: &crate::kernel::jobs::settings::Settings,
    ) -> (MetadataStatus, Option<String>) {
        let activity = Activity {
            source_id: item.source_id.clone(),
            sport_code: item.sport_code,
            name: item.activity_name.clone(),
            start_time: item.activity_time.clone(),
        };
        let preview = self.settings_service.preview(&activity, settings);

        let mut errors = Vec::new();

        if !preview.title.is_empty() {
            if let Err(e) = sink.set_activity_name(sink_id, &preview.title).await {
                errors.push(format!("title error: {e}"));
            }
        }

        if settings.privacy.visibility != crate::kernel::jobs::settings::Visibility::Default {
            let visibility = match settings.privacy.visibility {
                crate::kernel::jobs::settings::Visibility::Private => "private",
                crate::kernel::jobs::settings::Visibility::Public => "public",
                crate::kernel::jobs::settings::Visibility::Default => unreachable!(),
            };
            if let Err(e) = sink.set_privacy(sink_id, visibility).await {
                errors.push(format!("privacy error: {e}"));
            }
        }

        if settings.gear.enabled {
            if let Some(gear_id) = &settings.gear.gear_id {
                if let Err(e) = sink.link_gear(sink_id, gear_id).await {
                    errors.push(format!("gear error: {e}"));
                }
            }
        }

        if errors.is_empty() {
            (MetadataStatus::Success, None)
        } else {
            (MetadataStatus::Failed, Some(errors.join("; ")))
        }
    }
}

