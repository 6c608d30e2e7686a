//! The transfer worker: a single background task that polls for pending
//! jobs and drives their items through download -> upload -> metadata.
//!
//! There is exactly one worker per process (see `domains::transfer::mod`'s
//! singleton accessor). `start`/`stop`/`pause`/`resume` mirror a simple
//! thread-lifecycle API rather than a generic `Service` abstraction, since
//! this worker has exactly one job type and no dispatch table.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::common::error::TransferError;
use crate::domains::transfer::clients::{coros::CorosClient, garmin::GarminClient};
use crate::domains::transfer::clients::{SinkClient, SourceClient, UploadOutcome};
use crate::domains::transfer::duplicate_probe::DuplicateProbe;
use crate::domains::transfer::retry::RetryPolicy;
use crate::domains::transfer::settings_service::SettingsService;
use crate::kernel::jobs::item::{Item, ItemPatch, ItemStatus, MetadataStatus};
use crate::kernel::jobs::job::{Job, JobId, JobStatus};
use crate::kernel::jobs::settings::Settings;
use crate::kernel::jobs::store::StateStore;
use crate::kernel::secrets::SecretStore;

const POLL_INTERVAL: Duration = Duration::from_secs(1);
const JOB_SCAN_LIMIT: i64 = 10;
const STOP_WAIT_POLL: Duration = Duration::from_millis(100);

pub struct WorkerDeps {
    pub store: Arc<dyn StateStore>,
    pub secrets: Arc<SecretStore>,
    pub settings_service: Arc<SettingsService>,
    pub downloads_dir: PathBuf,
    pub duplicate_probe: DuplicateProbe,
}

struct WorkerState {
    cancel: CancellationToken,
    paused: AtomicBool,
    running: AtomicBool,
    current_job: RwLock<Option<JobId>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    /// Jobs cancelled via `orchestrator::cancel_job` while one of their items
    /// is in flight. Checked by `try_item_once` before every stage
    /// transition so an in-flight item can't write itself back to success
    /// after the store has already failed it out from under it. Cleared
    /// once `run_job` finishes with that job.
    cancelled_jobs: StdMutex<HashSet<JobId>>,
}

impl WorkerState {
    fn mark_job_cancelled(&self, job_id: JobId) {
        self.cancelled_jobs.lock().unwrap().insert(job_id);
    }

    fn clear_job_cancelled(&self, job_id: JobId) {
        self.cancelled_jobs.lock().unwrap().remove(&job_id);
    }

    fn is_job_cancelled(&self, job_id: JobId) -> bool {
        self.cancelled_jobs.lock().unwrap().contains(&job_id)
    }
}

pub struct TransferWorker {
    deps: Arc<WorkerDeps>,
    state: Arc<WorkerState>,
}

impl TransferWorker {
    pub fn new(deps: WorkerDeps) -> Self {
        Self {
            deps: Arc::new(deps),
            state: Arc::new(WorkerState {
                cancel: CancellationToken::new(),
                paused: AtomicBool::new(false),
                running: AtomicBool::new(false),
                current_job: RwLock::new(None),
                handle: Mutex::new(None),
                cancelled_jobs: StdMutex::new(HashSet::new()),
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.state.paused.load(Ordering::SeqCst)
    }

    pub async fn current_job(&self) -> Option<JobId> {
        *self.state.current_job.read().await
    }

    pub async fn start(&self) {
        let mut handle_slot = self.state.handle.lock().await;
        if handle_slot.is_some() {
            warn!("transfer worker start() called while already running");
            return;
        }
        self.state.running.store(true, Ordering::SeqCst);
        let deps = self.deps.clone();
        let state = self.state.clone();
        *handle_slot = Some(tokio::spawn(async move {
            run_loop(deps, state).await;
        }));
        info!("transfer worker started");
    }

    pub async fn stop(&self, wait: bool, timeout: Duration) {
        self.state.cancel.cancel();
        if !wait {
            return;
        }
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if !self.state.running.load(Ordering::SeqCst) {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!("transfer worker stop() timed out waiting for loop exit");
                break;
            }
            tokio::time::sleep(STOP_WAIT_POLL).await;
        }
    }

    pub fn pause(&self) {
        self.state.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.state.paused.store(false, Ordering::SeqCst);
    }

    /// Signals that `job_id` has been cancelled, so any of its items already
    /// in flight halt before their next stage transition instead of writing
    /// a stale success/skip over the store's cancellation sweep. Safe to
    /// call for a job this worker isn't even processing.
    pub fn signal_job_cancelled(&self, job_id: JobId) {
        self.state.mark_job_cancelled(job_id);
    }

    /// Process one specific job immediately, bypassing the scan. Used by the
    /// orchestrator's "run now" trigger; does not affect the poll loop.
    pub async fn process_job(&self, job_id: JobId) -> Result<(), TransferError> {
        process_single_job(&self.deps, &self.state, job_id).await
    }
}

async fn run_loop(deps: Arc<WorkerDeps>, state: Arc<WorkerState>) {
    info!("transfer worker loop starting");
    loop {
        if state.cancel.is_cancelled() {
            break;
        }
        if state.paused.load(Ordering::SeqCst) {
            tokio::select! {
                _ = state.cancel.cancelled() => break,
                _ = tokio::time::sleep(POLL_INTERVAL) => continue,
            }
        }

        let next = match find_next_pending_job(&deps.store).await {
            Ok(next) => next,
            Err(e) => {
                error!(error = %e, "failed to scan for pending jobs");
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            }
        };

        let Some(job_id) = next else {
            tokio::select! {
                _ = state.cancel.cancelled() => break,
                _ = tokio::time::sleep(POLL_INTERVAL) => continue,
            }
        };

        if let Err(e) = process_single_job(&deps, &state, job_id).await {
            error!(job_id = %job_id, error = %e, "job processing failed");
        }
    }

    state.running.store(false, Ordering::SeqCst);
    info!("transfer worker loop stopped");
}

async fn find_next_pending_job(store: &Arc<dyn StateStore>) -> Result<Option<JobId>, TransferError> {
    let jobs = store.list_jobs(JOB_SCAN_LIMIT, 0).await?;
    Ok(jobs
        .into_iter()
        .find(|j| j.status == JobStatus::Pending)
        .map(|j| j.id))
}

async fn process_single_job(
    deps: &Arc<WorkerDeps>,
    state: &Arc<WorkerState>,
    job_id: JobId,
) -> Result<(), TransferError> {
    let Some(job) = deps.store.get_job(job_id).await? else {
        warn!(job_id = %job_id, "job disappeared before processing");
        return Ok(());
    };

    *state.current_job.write().await = Some(job_id);
    let result = run_job(deps, state, job).await;
    *state.current_job.write().await = None;
    result
}

async fn run_job(deps: &Arc<WorkerDeps>, state: &Arc<WorkerState>, job: Job) -> Result<(), TransferError> {
    let job_id = job.id;
    let result = run_job_inner(deps, state, job).await;
    state.clear_job_cancelled(job_id);
    result
}

async fn run_job_inner(deps: &Arc<WorkerDeps>, state: &Arc<WorkerState>, job: Job) -> Result<(), TransferError> {
    let settings: Settings = serde_json::from_value(job.settings_snapshot.clone())
        .map_err(|e| TransferError::Validation(format!("invalid settings snapshot: {e}")))?;

    let Some((coros_email, coros_password)) = deps.secrets.get("coros").await? else {
        deps.store
            .set_job_error(job.id, "no coros credentials configured")
            .await?;
        deps.store.mark_job_completed(job.id, JobStatus::Failed).await?;
        return Ok(());
    };
    let Some((garmin_email, garmin_password)) = deps.secrets.get("garmin").await? else {
        deps.store
            .set_job_error(job.id, "no garmin credentials configured")
            .await?;
        deps.store.mark_job_completed(job.id, JobStatus::Failed).await?;
        return Ok(());
    };

    // Verify both sets of credentials once before touching any items.
    let mut probe_coros = CorosClient::new();
    if !probe_coros.login(&coros_email, &coros_password).await? {
        deps.store.set_job_error(job.id, "coros login failed").await?;
        deps.store.mark_job_completed(job.id, JobStatus::Failed).await?;
        return Ok(());
    }
    let mut probe_garmin = GarminClient::new();
    if !probe_garmin.login(&garmin_email, &garmin_password).await? {
        deps.store.set_job_error(job.id, "garmin login failed").await?;
        deps.store.mark_job_completed(job.id, JobStatus::Failed).await?;
        return Ok(());
    }

    deps.store.mark_job_started(job.id).await?;

    let concurrency = settings.concurrency.max(1) as usize;
    loop {
        if state.cancel.is_cancelled() || state.is_job_cancelled(job.id) {
            return Ok(());
        }

        if state.paused.load(Ordering::SeqCst) {
            deps.store.set_job_status(job.id, JobStatus::Paused).await?;
            loop {
                tokio::select! {
                    _ = state.cancel.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(POLL_INTERVAL) => {}
                }
                if state.cancel.is_cancelled() || state.is_job_cancelled(job.id) {
                    return Ok(());
                }
                if !state.paused.load(Ordering::SeqCst) {
                    break;
                }
            }
            deps.store.set_job_status(job.id, JobStatus::Running).await?;
            continue;
        }

        if let Some(refreshed) = deps.store.get_job(job.id).await? {
            if refreshed.status == JobStatus::Cancelled {
                return Ok(());
            }
        }

        let batch = deps.store.claim_items(job.id, concurrency as i64).await?;
        if batch.is_empty() {
            break;
        }

        let mut handles = Vec::with_capacity(batch.len());
        for item in batch {
            let deps = deps.clone();
            let state = state.clone();
            let settings = settings.clone();
            let credentials = (
                coros_email.clone(),
                coros_password.clone(),
                garmin_email.clone(),
                garmin_password.clone(),
            );
            handles.push(tokio::spawn(async move {
                process_item(deps, state, item, settings, credentials).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }

        deps.store.recompute_counts(job.id).await?;
    }

    let final_job = deps.store.recompute_counts(job.id).await?;
    let final_status = if final_job.failed > 0 && final_job.success == 0 {
        JobStatus::Failed
    } else {
        JobStatus::Completed
    };
    deps.store.mark_job_completed(job.id, final_status).await?;
    Ok(())
}

/// What `try_item_once` actually did. `Success` means the normal terminal
/// writes already happened; the `Halted*` variants mean it stopped early
/// because of a cooperative signal and wrote nothing past its last
/// completed stage.
enum ItemOutcome {
    Success,
    HaltedPaused,
    HaltedCancelled,
}

/// Checks pause/cancel state for `job_id`, returning the halt the caller
/// should act on, or `None` to keep going. Cancellation takes priority over
/// pause: a cancelled job should never sit around waiting to be resumed.
fn check_signal(state: &Arc<WorkerState>, job_id: JobId) -> Option<ItemOutcome> {
    if state.cancel.is_cancelled() || state.is_job_cancelled(job_id) {
        Some(ItemOutcome::HaltedCancelled)
    } else if state.paused.load(Ordering::SeqCst) {
        Some(ItemOutcome::HaltedPaused)
    } else {
        None
    }
}

async fn process_item(
    deps: Arc<WorkerDeps>,
    state: Arc<WorkerState>,
    item: Item,
    settings: Settings,
    credentials: (String, String, String, String),
) {
    let (coros_email, coros_password, garmin_email, garmin_password) = credentials;
    let retry_policy: RetryPolicy = settings.retry.clone().into();
    let mut attempt = 0;

    loop {
        attempt += 1;
        match try_item_once(
            &deps,
            &state,
            &item,
            &settings,
            &coros_email,
            &coros_password,
            &garmin_email,
            &garmin_password,
        )
        .await
        {
            Ok(ItemOutcome::Success) => return,
            Ok(ItemOutcome::HaltedCancelled) => return,
            Ok(ItemOutcome::HaltedPaused) => {
                // Leave it reclaimable: the file is cached on disk if the
                // download stage already finished, so the next attempt
                // picks up where this one stopped.
                let _ = deps
                    .store
                    .update_item(item.id, ItemPatch::default().status(ItemStatus::Pending))
                    .await;
                return;
            }
            Err(e) => {
                let message = e.to_string();
                warn!(item_id = %item.id, attempt, error = %message, "item processing failed");

                if !e.is_retryable() {
                    let _ = deps
                        .store
                        .update_item(
                            item.id,
                            ItemPatch::default()
                                .status(ItemStatus::Failed)
                                .error_message(message),
                        )
                        .await;
                    return;
                }

                let retry_count = match deps.store.increment_retry(item.id).await {
                    Ok(n) => n,
                    Err(e) => {
                        error!(item_id = %item.id, error = %e, "failed to record retry");
                        return;
                    }
                };

                if !retry_policy.has_attempts_remaining(retry_count) {
                    let _ = deps
                        .store
                        .update_item(
                            item.id,
                            ItemPatch::default()
                                .status(ItemStatus::Failed)
                                .error_message(message),
                        )
                        .await;
                    return;
                }

                let _ = deps
                    .store
                    .update_item(item.id, ItemPatch::default().error_message(message))
                    .await;
                tokio::time::sleep(retry_policy.delay(attempt as i32)).await;
            }
        }
    }
}

async fn try_item_once(
    deps: &Arc<WorkerDeps>,
    state: &Arc<WorkerState>,
    item: &Item,
    settings: &Settings,
    coros_email: &str,
    coros_password: &str,
    garmin_email: &str,
    garmin_password: &str,
) -> Result<ItemOutcome, TransferError> {
    if let Some(halt) = check_signal(state, item.job_id) {
        return Ok(halt);
    }

    let mut coros = CorosClient::new();
    if !coros.login(coros_email, coros_password).await? {
        return Err(TransferError::Auth("coros login failed".to_string()));
    }
    let mut garmin = GarminClient::new();
    if !garmin.login(garmin_email, garmin_password).await? {
        return Err(TransferError::Auth("garmin login failed".to_string()));
    }

    deps.store
        .update_item(item.id, ItemPatch::default().status(ItemStatus::Downloading))
        .await?;

    let save_dir = deps
        .downloads_dir
        .join("coros")
        .join(item.sport_code.to_string());
    tokio::fs::create_dir_all(&save_dir)
        .await
        .map_err(|e| TransferError::TransientIO(e.to_string()))?;
    let fit_path = save_dir.join(format!("{}.fit", item.source_id));

    if tokio::fs::metadata(&fit_path).await.is_err() {
        let downloaded = coros
            .download(&item.source_id, item.sport_code, "fit", &fit_path)
            .await?;
        if !downloaded {
            return Err(TransferError::TransientIO("download returned no file".to_string()));
        }
    }

    if let Some(halt) = check_signal(state, item.job_id) {
        return Ok(halt);
    }

    deps.store
        .update_item(
            item.id,
            ItemPatch::default()
                .status(ItemStatus::Uploading)
                .local_path(fit_path.to_string_lossy().to_string()),
        )
        .await?;

    let outcome = garmin
        .upload_fit(&fit_path, item.activity_name.as_deref(), item.activity_time.as_deref())
        .await?;

    let sink_id = match outcome {
        UploadOutcome::Duplicate => {
            if let Some(halt) = check_signal(state, item.job_id) {
                return Ok(halt);
            }
            deps.store
                .update_item(
                    item.id,
                    ItemPatch::default()
                        .status(ItemStatus::Skipped)
                        .sink_id("duplicate")
                        .metadata_status(MetadataStatus::Skipped),
                )
                .await?;
            return Ok(ItemOutcome::Success);
        }
        UploadOutcome::Created(id) => id,
        UploadOutcome::Ambiguous => {
            let Some(raw) = &item.activity_time else {
                return Err(TransferError::AmbiguousUpload {
                    item_id: item.id.into_uuid(),
                });
            };
            let Some(target) = DuplicateProbe::parse_start_time(raw) else {
                return Err(TransferError::AmbiguousUpload {
                    item_id: item.id.into_uuid(),
                });
            };
            match deps.duplicate_probe.confirm(&garmin, target).await {
                Some(id) => id,
                None => {
                    return Err(TransferError::AmbiguousUpload {
                        item_id: item.id.into_uuid(),
                    })
                }
            }
        }
    };

    let (metadata_status, metadata_error) =
        apply_metadata(&garmin, &sink_id, item, settings, &deps.settings_service).await;

    if let Some(halt) = check_signal(state, item.job_id) {
        return Ok(halt);
    }

    deps.store
        .update_item(
            item.id,
            ItemPatch {
                status: Some(ItemStatus::Success),
                sink_id: Some(Some(sink_id)),
                metadata_status: Some(metadata_status),
                metadata_error: metadata_error.map(Some),
                ..Default::default()
            },
        )
        .await?;

    Ok(ItemOutcome::Success)
}

/// Applies title, then privacy, then gear, in that order; a failure in one
/// step does not stop the rest. Description is never rendered against the
/// sink: the vendor API this was built against has no endpoint for it.
async fn apply_metadata(
    garmin: &GarminClient,
    sink_id: &str,
    item: &Item,
    settings: &Settings,
    settings_service: &Arc<SettingsService>,
) -> (MetadataStatus, Option<String>) {
    use crate::domains::transfer::clients::Activity;

    let activity = Activity {
        source_id: item.source_id.clone(),
        sport_code: item.sport_code,
        name: item.activity_name.clone(),
        start_time: item.activity_time.clone(),
    };
    let preview = settings_service.preview(&activity, settings);

    let mut errors = Vec::new();

    if !preview.title.is_empty() {
        if let Err(e) = garmin.set_activity_name(sink_id, &preview.title).await {
            errors.push(format!("title error: {e}"));
        }
    }

    if settings.privacy.visibility != crate::kernel::jobs::settings::Visibility::Default {
        let visibility = match settings.privacy.visibility {
            crate::kernel::jobs::settings::Visibility::Private => "private",
            crate::kernel::jobs::settings::Visibility::Public => "public",
            crate::kernel::jobs::settings::Visibility::Default => unreachable!(),
        };
        if let Err(e) = garmin.set_privacy(sink_id, visibility).await {
            errors.push(format!("privacy error: {e}"));
        }
    }

    if settings.gear.enabled {
        if let Some(gear_id) = &settings.gear.gear_id {
            if let Err(e) = garmin.link_gear(sink_id, gear_id).await {
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
