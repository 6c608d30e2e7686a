//! End-to-end coverage of the durable job/item state machine: creating a
//! job directly against the store (bypassing vendor auth, which the
//! orchestrator's `create_job` requires), claiming items concurrently,
//! recomputing counts, and the terminal-status rules.

mod common;

use test_context::test_context;
use transfer_core::kernel::jobs::item::{Item, ItemPatch, ItemStatus};
use transfer_core::kernel::jobs::job::{Job, JobStatus};

use common::TestHarness;

fn sample_job_with_items(n: usize) -> (Job, Vec<Item>) {
    let job = Job::builder()
        .start_date(common::date(2024, 1, 1))
        .end_date(common::date(2024, 1, 31))
        .settings_snapshot(serde_json::json!({}))
        .total(n as i64)
        .build();

    let items = (0..n)
        .map(|i| {
            Item::builder()
                .job_id(job.id)
                .source_id(format!("act-{i}"))
                .sport_code(100)
                .build()
        })
        .collect();

    (job, items)
}

#[test_context(TestHarness)]
#[tokio::test]
async fn create_job_persists_job_and_items(ctx: &TestHarness) {
    let (job, items) = sample_job_with_items(3);
    ctx.store.create_job(&job, &items).await.unwrap();

    let fetched = ctx.store.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, JobStatus::Pending);
    assert_eq!(fetched.total, 3);

    let fetched_items = ctx.store.list_items(job.id).await.unwrap();
    assert_eq!(fetched_items.len(), 3);
    assert!(fetched_items.iter().all(|i| i.status == ItemStatus::Pending));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn claim_items_transitions_to_downloading_and_respects_limit(ctx: &TestHarness) {
    let (job, items) = sample_job_with_items(5);
    ctx.store.create_job(&job, &items).await.unwrap();

    let claimed = ctx.store.claim_items(job.id, 2).await.unwrap();
    assert_eq!(claimed.len(), 2);
    assert!(claimed.iter().all(|i| i.status == ItemStatus::Downloading));

    // The same two items are not claimable again; the other three still are.
    let remaining = ctx.store.claim_items(job.id, 10).await.unwrap();
    assert_eq!(remaining.len(), 3);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn recompute_counts_reflects_terminal_item_statuses(ctx: &TestHarness) {
    let (job, items) = sample_job_with_items(3);
    ctx.store.create_job(&job, &items).await.unwrap();

    ctx.store
        .update_item(items[0].id, ItemPatch::default().status(ItemStatus::Success))
        .await
        .unwrap();
    ctx.store
        .update_item(items[1].id, ItemPatch::default().status(ItemStatus::Failed))
        .await
        .unwrap();

    let recomputed = ctx.store.recompute_counts(job.id).await.unwrap();
    assert_eq!(recomputed.total, 3);
    assert_eq!(recomputed.completed, 2);
    assert_eq!(recomputed.success, 1);
    assert_eq!(recomputed.failed, 1);
    assert_eq!(recomputed.pending_like(), 1);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn increment_retry_resets_item_to_pending_for_another_claim(ctx: &TestHarness) {
    let (job, items) = sample_job_with_items(1);
    ctx.store.create_job(&job, &items).await.unwrap();
    ctx.store.claim_items(job.id, 1).await.unwrap();

    let retry_count = ctx.store.increment_retry(items[0].id).await.unwrap();
    assert_eq!(retry_count, 1);

    let reclaimed = ctx.store.claim_items(job.id, 1).await.unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].id, items[0].id);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn cancel_job_marks_it_cancelled(ctx: &TestHarness) {
    let (job, items) = sample_job_with_items(1);
    ctx.store.create_job(&job, &items).await.unwrap();

    ctx.store.cancel_job(job.id).await.unwrap();
    let fetched = ctx.store.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, JobStatus::Cancelled);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn cancel_job_fails_non_terminal_items_and_recomputes_counts(ctx: &TestHarness) {
    let (job, items) = sample_job_with_items(3);
    ctx.store.create_job(&job, &items).await.unwrap();
    ctx.store
        .update_item(items[0].id, ItemPatch::default().status(ItemStatus::Success))
        .await
        .unwrap();

    ctx.store.cancel_job(job.id).await.unwrap();

    let fetched_items = ctx.store.list_items(job.id).await.unwrap();
    let by_id = |id| fetched_items.iter().find(|i| i.id == id).unwrap();
    assert_eq!(by_id(items[0].id).status, ItemStatus::Success);
    assert_eq!(by_id(items[1].id).status, ItemStatus::Failed);
    assert_eq!(by_id(items[1].id).error_message.as_deref(), Some("cancelled"));
    assert_eq!(by_id(items[2].id).status, ItemStatus::Failed);

    let fetched_job = ctx.store.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(fetched_job.success, 1);
    assert_eq!(fetched_job.failed, 2);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn cancel_job_is_a_no_op_on_terminal_jobs(ctx: &TestHarness) {
    let (job, items) = sample_job_with_items(1);
    ctx.store.create_job(&job, &items).await.unwrap();
    ctx.store
        .update_item(items[0].id, ItemPatch::default().status(ItemStatus::Success))
        .await
        .unwrap();
    ctx.store.mark_job_completed(job.id, JobStatus::Completed).await.unwrap();

    ctx.store.cancel_job(job.id).await.unwrap();

    let fetched_job = ctx.store.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(fetched_job.status, JobStatus::Completed);
    let fetched_item = ctx.store.list_items(job.id).await.unwrap().remove(0);
    assert_eq!(fetched_item.status, ItemStatus::Success);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn orchestrator_cancel_job_signals_worker_and_sweeps_store(ctx: &TestHarness) {
    let (job, items) = sample_job_with_items(2);
    ctx.store.create_job(&job, &items).await.unwrap();
    ctx.store.claim_items(job.id, 2).await.unwrap();

    let worker = ctx.worker(std::env::temp_dir());
    let orchestrator = ctx.orchestrator(worker.clone());

    orchestrator.cancel_job(job.id).await.unwrap();

    let fetched_job = ctx.store.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(fetched_job.status, JobStatus::Cancelled);
    let fetched_items = ctx.store.list_items(job.id).await.unwrap();
    assert!(fetched_items.iter().all(|i| i.status == ItemStatus::Failed));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn delete_job_removes_it(ctx: &TestHarness) {
    let (job, items) = sample_job_with_items(1);
    ctx.store.create_job(&job, &items).await.unwrap();

    ctx.store.delete_job(job.id).await.unwrap();
    assert!(ctx.store.get_job(job.id).await.unwrap().is_none());
}
