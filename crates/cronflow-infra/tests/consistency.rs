//! End-to-end integrity scenarios against real SQLite storage.
//!
//! These walk the same inconsistent states the external agent leaves behind
//! after crashes: status drift between linked records, rows orphaned by a
//! deleted job, and logs written before their execution.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use cronflow_core::integrity::IntegrityService;
use cronflow_core::repository::{ExecutionRepository, JobRepository, LogRepository};
use cronflow_infra::sqlite::execution::SqliteExecutionRepository;
use cronflow_infra::sqlite::job::SqliteJobRepository;
use cronflow_infra::sqlite::log::SqliteLogRepository;
use cronflow_infra::sqlite::pool::DatabasePool;
use cronflow_types::execution::{partial_exit_code, Execution, ExecutionStatus};
use cronflow_types::job::{Job, JobPayload, JobStatus};
use cronflow_types::log::{EventLog, LogStatus};
use uuid::Uuid;

async fn test_pool() -> DatabasePool {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test.db");
    let url = format!("sqlite://{}?mode=rwc", db_path.display());
    std::mem::forget(dir);
    DatabasePool::new(&url).await.unwrap()
}

fn service(
    pool: &DatabasePool,
) -> IntegrityService<SqliteJobRepository, SqliteExecutionRepository, SqliteLogRepository> {
    IntegrityService::new(
        SqliteJobRepository::new(pool.clone()),
        SqliteExecutionRepository::new(pool.clone()),
        SqliteLogRepository::new(pool.clone()),
    )
}

fn sample_job(status: JobStatus, server_ids: Vec<Uuid>) -> Job {
    let now = Utc::now();
    Job {
        id: Uuid::now_v7(),
        event_id: Uuid::now_v7(),
        user_id: Uuid::now_v7(),
        status,
        priority: 0,
        payload: JobPayload::Script {
            interpreter: "bash".to_string(),
            source: "echo run".to_string(),
            environment: HashMap::new(),
            server_ids,
        },
        scheduled_for: now,
        agent_id: None,
        attempts: 1,
        last_error: None,
        metadata: HashMap::new(),
        created_at: now,
        updated_at: now,
    }
}

fn sample_execution(job_id: Uuid, status: ExecutionStatus, exit_code: Option<i32>) -> Execution {
    let now = Utc::now();
    Execution {
        id: Execution::derive_id(job_id, now),
        job_id,
        server_id: None,
        status,
        started_at: now,
        completed_at: status.is_terminal().then_some(now),
        exit_code,
        output: None,
        error: None,
        metadata: HashMap::new(),
        created_at: now,
        updated_at: now,
    }
}

fn sample_log(job_id: Option<Uuid>, status: LogStatus) -> EventLog {
    let now = Utc::now();
    EventLog {
        id: Uuid::now_v7(),
        event_id: Uuid::now_v7(),
        workflow_id: None,
        job_id,
        execution_id: None,
        status,
        output: None,
        started_at: now,
        completed_at: None,
        duration_ms: None,
        successful: matches!(status, LogStatus::Success | LogStatus::Partial),
        error: None,
        retry_count: 0,
        created_at: now,
        updated_at: now,
    }
}

/// Agent finished the execution (exit 0) but died before touching the log:
/// reconciliation flips the stale running log to success.
#[tokio::test]
async fn reconciliation_promotes_stale_running_log() {
    let pool = test_pool().await;
    let svc = service(&pool);
    let jobs = SqliteJobRepository::new(pool.clone());
    let executions = SqliteExecutionRepository::new(pool.clone());
    let logs = SqliteLogRepository::new(pool.clone());

    let job = sample_job(JobStatus::Running, vec![]);
    jobs.create(&job).await.unwrap();

    // Log written (and linked) first, execution completed afterwards.
    let exec = sample_execution(job.id, ExecutionStatus::Completed, Some(0));
    executions.create(&exec).await.unwrap();

    let mut log = sample_log(Some(job.id), LogStatus::Running);
    log.execution_id = Some(exec.id.clone());
    log.updated_at = Utc::now() - Duration::seconds(30);
    logs.create(&log).await.unwrap();

    let changed = svc.reconcile_statuses().await.unwrap();
    assert_eq!(changed, 1);

    let updated = logs.get(&log.id).await.unwrap().unwrap();
    assert_eq!(updated.status, LogStatus::Success);
    assert!(updated.successful);

    // A second pass finds nothing left to fix.
    assert_eq!(svc.reconcile_statuses().await.unwrap(), 0);
}

/// Partial completion on a multi-target job: exit code 100 + failed targets
/// maps the log to partial, which still counts as successful.
#[tokio::test]
async fn partial_exit_code_maps_log_to_partial() {
    let pool = test_pool().await;
    let svc = service(&pool);
    let jobs = SqliteJobRepository::new(pool.clone());
    let executions = SqliteExecutionRepository::new(pool.clone());
    let logs = SqliteLogRepository::new(pool.clone());

    // Three target servers, one failed.
    let job = sample_job(
        JobStatus::Completed,
        vec![Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7()],
    );
    jobs.create(&job).await.unwrap();

    let exec = sample_execution(job.id, ExecutionStatus::Completed, Some(partial_exit_code(1)));
    assert_eq!(exec.exit_code, Some(101));
    executions.create(&exec).await.unwrap();

    let mut log = sample_log(Some(job.id), LogStatus::Running);
    log.execution_id = Some(exec.id.clone());
    log.updated_at = Utc::now() - Duration::seconds(30);
    logs.create(&log).await.unwrap();

    assert_eq!(svc.reconcile_statuses().await.unwrap(), 1);

    let updated = logs.get(&log.id).await.unwrap().unwrap();
    assert_eq!(updated.status, LogStatus::Partial);
    assert!(updated.successful);
}

/// Audit finds rows pointing at a deleted job; cleanup marks the log and
/// deletes the execution, and the follow-up audit comes back healthy.
#[tokio::test]
async fn orphan_audit_and_cleanup() {
    let pool = test_pool().await;
    let svc = service(&pool);
    let executions = SqliteExecutionRepository::new(pool.clone());
    let logs = SqliteLogRepository::new(pool.clone());

    let gone_job = Uuid::now_v7();

    let orphan_exec = sample_execution(gone_job, ExecutionStatus::Completed, Some(0));
    executions.create(&orphan_exec).await.unwrap();

    let mut orphan_log = sample_log(Some(gone_job), LogStatus::Success);
    orphan_log.execution_id = Some(orphan_exec.id.clone());
    logs.create(&orphan_log).await.unwrap();

    let report = svc.check_integrity().await.unwrap();
    assert!(!report.is_healthy());
    assert_eq!(report.orphaned_logs_sample.len(), 1);
    assert_eq!(report.orphaned_executions_sample.len(), 1);

    let cleanup = svc.cleanup_orphans().await.unwrap();
    assert_eq!(cleanup.logs_marked, 1);
    assert_eq!(cleanup.executions_deleted, 1);
    assert_eq!(cleanup.errors, 0);

    let marked = logs.get(&orphan_log.id).await.unwrap().unwrap();
    assert_eq!(marked.status, LogStatus::Failure);
    assert!(marked.error.unwrap_or_default().contains("ORPHANED"));
    assert!(executions.get(&orphan_exec.id).await.unwrap().is_none());

    // Re-running is a no-op: the marker is not stacked, nothing is deleted.
    let again = svc.cleanup_orphans().await.unwrap();
    assert_eq!(again.logs_marked, 0);
    assert_eq!(again.executions_deleted, 0);

    let after = svc.check_integrity().await.unwrap();
    assert!(after.orphaned_executions_sample.is_empty());
}

/// A log written before its execution: repair synthesizes a recovery
/// execution from the log's captured fields and links it.
#[tokio::test]
async fn unlinked_log_repair_synthesizes_execution() {
    let pool = test_pool().await;
    let svc = service(&pool);
    let jobs = SqliteJobRepository::new(pool.clone());
    let executions = SqliteExecutionRepository::new(pool.clone());
    let logs = SqliteLogRepository::new(pool.clone());

    let job = sample_job(JobStatus::Completed, vec![]);
    jobs.create(&job).await.unwrap();

    let log = sample_log(Some(job.id), LogStatus::Success);
    logs.create(&log).await.unwrap();

    let repair = svc.fix_unlinked_logs().await.unwrap();
    assert_eq!(repair.repaired, 1);
    assert_eq!(repair.failed, 0);

    let relinked = logs.get(&log.id).await.unwrap().unwrap();
    let execution_id = relinked.execution_id.expect("log should be linked");

    let synthesized = executions.get(&execution_id).await.unwrap().unwrap();
    assert_eq!(synthesized.job_id, job.id);
    assert_eq!(synthesized.status, ExecutionStatus::Completed);
    assert_eq!(synthesized.exit_code, Some(0));
    assert_eq!(
        synthesized.metadata.get("recovery"),
        Some(&serde_json::json!(true))
    );
}
