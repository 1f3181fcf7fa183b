//! Integration tests for the job repository against a real Postgres.

mod common;

use common::TestHarness;
use cronmaster::domains::jobs::{
    CreateJobParams, ExecutionOutcome, ExecutionStatus, Job, JobExecution, JobListFilter, JobStatus, TriggeredBy,
    UpdateJobParams,
};
use cronmaster::common::pagination::PageRequest;
use test_context::test_context;

fn every_minute(url: &str) -> CreateJobParams {
    CreateJobParams::builder()
        .name("echo job")
        .url(url)
        .cron_expression("* * * * *")
        .build()
}

#[test_context(TestHarness)]
#[tokio::test]
async fn create_computes_next_execution_and_arms_active(ctx: &TestHarness) {
    let user = ctx.create_user("create_computes_next_execution").await;

    let job = Job::create(&ctx.db_pool, user, every_minute("https://example.test/webhook"))
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Active);
    assert!(job.next_execution.is_some());
    assert!(job.next_execution.unwrap() > job.created_at);
    assert_eq!(job.success_count, 0);
    assert_eq!(job.failure_count, 0);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn find_by_id_is_scoped_to_owner(ctx: &TestHarness) {
    let owner = ctx.create_user("find_scoped_owner").await;
    let other = ctx.create_user("find_scoped_other").await;

    let job = Job::create(&ctx.db_pool, owner, every_minute("https://example.test/a"))
        .await
        .unwrap();

    assert!(Job::find_by_id(&ctx.db_pool, owner, job.id).await.is_ok());
    assert!(Job::find_by_id(&ctx.db_pool, other, job.id).await.is_err());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn toggle_pause_clears_next_execution_and_resume_recomputes(ctx: &TestHarness) {
    let user = ctx.create_user("toggle_pause_resume").await;
    let job = Job::create(&ctx.db_pool, user, every_minute("https://example.test/b"))
        .await
        .unwrap();

    let paused = Job::toggle(&ctx.db_pool, user, job.id).await.unwrap();
    assert_eq!(paused.status, JobStatus::Paused);
    assert!(paused.next_execution.is_none());

    let resumed = Job::toggle(&ctx.db_pool, user, job.id).await.unwrap();
    assert_eq!(resumed.status, JobStatus::Active);
    assert!(resumed.next_execution.is_some());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn delete_is_idempotent_and_clears_next_execution(ctx: &TestHarness) {
    let user = ctx.create_user("delete_idempotent").await;
    let job = Job::create(&ctx.db_pool, user, every_minute("https://example.test/c"))
        .await
        .unwrap();

    Job::delete(&ctx.db_pool, user, job.id).await.unwrap();
    Job::delete(&ctx.db_pool, user, job.id).await.unwrap();

    let err = Job::find_by_id(&ctx.db_pool, user, job.id).await.unwrap_err();
    assert!(matches!(err, cronmaster::common::ServiceError::NotFound));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn update_with_new_cron_recomputes_next_execution(ctx: &TestHarness) {
    let user = ctx.create_user("update_new_cron").await;
    let job = Job::create(&ctx.db_pool, user, every_minute("https://example.test/d"))
        .await
        .unwrap();
    let original_next = job.next_execution.unwrap();

    let updated = Job::update(
        &ctx.db_pool,
        user,
        job.id,
        UpdateJobParams::builder().cron_expression("0 0 1 1 *").build(),
    )
    .await
    .unwrap();

    assert_ne!(updated.next_execution.unwrap(), original_next);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn update_to_paused_status_clears_next_execution(ctx: &TestHarness) {
    let user = ctx.create_user("update_to_paused").await;
    let job = Job::create(&ctx.db_pool, user, every_minute("https://example.test/e"))
        .await
        .unwrap();

    let updated = Job::update(
        &ctx.db_pool,
        user,
        job.id,
        UpdateJobParams::builder().status(JobStatus::Paused).build(),
    )
    .await
    .unwrap();

    assert_eq!(updated.status, JobStatus::Paused);
    assert!(updated.next_execution.is_none());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn list_filters_by_status_and_search_and_paginates(ctx: &TestHarness) {
    let user = ctx.create_user("list_filters").await;

    for i in 0..3 {
        Job::create(
            &ctx.db_pool,
            user,
            CreateJobParams::builder()
                .name(format!("alpha job {i}"))
                .url("https://example.test/alpha")
                .cron_expression("* * * * *")
                .build(),
        )
        .await
        .unwrap();
    }
    let beta = Job::create(
        &ctx.db_pool,
        user,
        CreateJobParams::builder()
            .name("beta job")
            .url("https://example.test/beta")
            .cron_expression("* * * * *")
            .build(),
    )
    .await
    .unwrap();
    Job::toggle(&ctx.db_pool, user, beta.id).await.unwrap();

    let page = PageRequest::default().validate().unwrap();

    let (active_only, active_total) = Job::list(
        &ctx.db_pool,
        user,
        JobListFilter {
            status: Some(JobStatus::Active),
            search: None,
        },
        page,
    )
    .await
    .unwrap();
    assert_eq!(active_total, 3);
    assert_eq!(active_only.len(), 3);

    let (beta_search, beta_total) = Job::list(
        &ctx.db_pool,
        user,
        JobListFilter {
            status: None,
            search: Some("beta".to_string()),
        },
        page,
    )
    .await
    .unwrap();
    assert_eq!(beta_total, 1);
    assert_eq!(beta_search[0].name, "beta job");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn record_execution_end_increments_counters_and_advances_next_execution(ctx: &TestHarness) {
    let user = ctx.create_user("record_end_counters").await;
    let job = Job::create(&ctx.db_pool, user, every_minute("https://example.test/f"))
        .await
        .unwrap();
    let before_next = job.next_execution.unwrap();

    let exec_id = JobExecution::record_start(&ctx.db_pool, job.id, TriggeredBy::Cron)
        .await
        .unwrap();

    JobExecution::record_end(
        &ctx.db_pool,
        exec_id,
        ExecutionOutcome {
            status: ExecutionStatus::Success,
            duration_ms: 12,
            response_code: Some(200),
            response_body: Some("ok".to_string()),
            response_headers: None,
            error_message: None,
        },
    )
    .await
    .unwrap();

    let after = Job::find_by_id(&ctx.db_pool, user, job.id).await.unwrap();
    assert_eq!(after.success_count, 1);
    assert_eq!(after.failure_count, 0);
    assert!(after.last_execution.is_some());
    assert!(after.next_execution.unwrap() >= before_next);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn record_execution_end_on_paused_job_leaves_next_execution_null(ctx: &TestHarness) {
    let user = ctx.create_user("record_end_paused").await;
    let job = Job::create(&ctx.db_pool, user, every_minute("https://example.test/g"))
        .await
        .unwrap();
    let exec_id = JobExecution::record_start(&ctx.db_pool, job.id, TriggeredBy::Cron)
        .await
        .unwrap();

    Job::toggle(&ctx.db_pool, user, job.id).await.unwrap();

    JobExecution::record_end(&ctx.db_pool, exec_id, ExecutionOutcome::worker_crashed())
        .await
        .unwrap();

    let after = Job::find_by_id(&ctx.db_pool, user, job.id).await.unwrap();
    assert_eq!(after.status, JobStatus::Paused);
    assert!(after.next_execution.is_none());
    assert_eq!(after.failure_count, 1);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn prune_deletes_only_rows_older_than_cutoff(ctx: &TestHarness) {
    let user = ctx.create_user("prune_cutoff").await;
    let job = Job::create(&ctx.db_pool, user, every_minute("https://example.test/h"))
        .await
        .unwrap();

    let exec_id = JobExecution::record_start(&ctx.db_pool, job.id, TriggeredBy::Cron)
        .await
        .unwrap();
    JobExecution::record_end(&ctx.db_pool, exec_id, ExecutionOutcome::worker_crashed())
        .await
        .unwrap();

    let cutoff_in_past = chrono::Utc::now() - chrono::Duration::days(1);
    let deleted = JobExecution::prune(&ctx.db_pool, cutoff_in_past).await.unwrap();
    assert_eq!(deleted, 0);

    let cutoff_in_future = chrono::Utc::now() + chrono::Duration::days(1);
    let deleted = JobExecution::prune(&ctx.db_pool, cutoff_in_future).await.unwrap();
    assert_eq!(deleted, 1);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn list_orphaned_running_only_returns_rows_older_than_process_start(ctx: &TestHarness) {
    let user = ctx.create_user("orphaned_running").await;
    let job = Job::create(&ctx.db_pool, user, every_minute("https://example.test/i"))
        .await
        .unwrap();

    let exec_id = JobExecution::record_start(&ctx.db_pool, job.id, TriggeredBy::Cron)
        .await
        .unwrap();

    let process_start = chrono::Utc::now() + chrono::Duration::seconds(1);
    let orphaned = JobExecution::list_orphaned_running(&ctx.db_pool, process_start)
        .await
        .unwrap();
    assert!(orphaned.contains(&exec_id));

    JobExecution::record_end(&ctx.db_pool, exec_id, ExecutionOutcome::worker_crashed())
        .await
        .unwrap();

    let orphaned_after = JobExecution::list_orphaned_running(&ctx.db_pool, process_start)
        .await
        .unwrap();
    assert!(!orphaned_after.contains(&exec_id));
}
