//! Execution rows: one per invocation attempt, plus the atomic operations
//! that open and close them. Closing an execution is the only place the
//! parent job's counters and `next_execution` are mutated outside of
//! `UpdateJob`/`ToggleJob`/`DeleteJob` — it happens in the same transaction
//! so a reader never observes a finalized execution with a stale job row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::common::entity_ids::{ExecutionId, JobId};
use crate::common::{Headers, Result, ServiceError};
use crate::cron::{parse_timezone, CronExpression};

use super::model::JobStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "execution_status", rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Success,
    Failed,
    Timeout,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "triggered_by", rename_all = "snake_case")]
pub enum TriggeredBy {
    Cron,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecution {
    pub id: ExecutionId,
    pub job_id: JobId,
    pub executed_at: DateTime<Utc>,
    pub status: ExecutionStatus,
    pub duration_ms: Option<i64>,
    pub response_code: Option<i32>,
    pub response_body: Option<String>,
    pub response_headers: Option<Headers>,
    pub error_message: Option<String>,
    pub triggered_by: TriggeredBy,
}

#[derive(Debug, sqlx::FromRow)]
struct ExecutionRow {
    id: ExecutionId,
    job_id: JobId,
    executed_at: DateTime<Utc>,
    status: ExecutionStatus,
    duration_ms: Option<i64>,
    response_code: Option<i32>,
    response_body: Option<String>,
    response_headers: Option<sqlx::types::Json<Headers>>,
    error_message: Option<String>,
    triggered_by: TriggeredBy,
}

impl From<ExecutionRow> for JobExecution {
    fn from(row: ExecutionRow) -> Self {
        JobExecution {
            id: row.id,
            job_id: row.job_id,
            executed_at: row.executed_at,
            status: row.status,
            duration_ms: row.duration_ms,
            response_code: row.response_code,
            response_body: row.response_body,
            response_headers: row.response_headers.map(|j| j.0),
            error_message: row.error_message,
            triggered_by: row.triggered_by,
        }
    }
}

/// The invoker's verdict on one invocation, ready to be persisted by
/// [`JobExecution::record_end`]. Response body is already truncated by the
/// invoker before this is constructed.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub status: ExecutionStatus,
    pub duration_ms: i64,
    pub response_code: Option<i32>,
    pub response_body: Option<String>,
    pub response_headers: Option<Headers>,
    pub error_message: Option<String>,
}

impl ExecutionOutcome {
    pub fn worker_crashed() -> Self {
        Self {
            status: ExecutionStatus::Failed,
            duration_ms: 0,
            response_code: None,
            response_body: None,
            response_headers: None,
            error_message: Some("worker_crashed".to_string()),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            status: ExecutionStatus::Cancelled,
            duration_ms: 0,
            response_code: None,
            response_body: None,
            response_headers: None,
            error_message: Some("shutdown drain deadline exceeded".to_string()),
        }
    }

    fn increments_failure_count(&self) -> bool {
        matches!(
            self.status,
            ExecutionStatus::Failed | ExecutionStatus::Timeout | ExecutionStatus::Cancelled
        )
    }
}

impl JobExecution {
    pub async fn record_start(pool: &PgPool, job_id: JobId, triggered_by: TriggeredBy) -> Result<ExecutionId> {
        let id: (ExecutionId,) = sqlx::query_as(
            "INSERT INTO job_executions (job_id, executed_at, status, triggered_by) \
             VALUES ($1, NOW(), 'running', $2) RETURNING id",
        )
        .bind(job_id)
        .bind(triggered_by)
        .fetch_one(pool)
        .await
        .map_err(ServiceError::from_sqlx_for_write)?;

        Ok(id.0)
    }

    /// Finalize the execution row and advance the parent job's counters and
    /// `next_execution` in one transaction. Callers (the dispatcher) are
    /// responsible for retrying on `ServiceError::Concurrency`.
    pub async fn record_end(pool: &PgPool, exec_id: ExecutionId, outcome: ExecutionOutcome) -> Result<()> {
        let mut tx = pool.begin().await.map_err(ServiceError::from_sqlx_for_write)?;

        let job_id: (JobId,) = sqlx::query_as("SELECT job_id FROM job_executions WHERE id = $1 FOR UPDATE")
            .bind(exec_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(ServiceError::from_sqlx_for_write)?
            .ok_or(ServiceError::NotFound)?;

        sqlx::query(
            r#"
            UPDATE job_executions SET
                status = $2,
                duration_ms = $3,
                response_code = $4,
                response_body = $5,
                response_headers = $6,
                error_message = $7
            WHERE id = $1
            "#,
        )
        .bind(exec_id)
        .bind(outcome.status)
        .bind(outcome.duration_ms)
        .bind(&outcome.response_code)
        .bind(&outcome.response_body)
        .bind(outcome.response_headers.clone().map(sqlx::types::Json))
        .bind(&outcome.error_message)
        .execute(&mut *tx)
        .await
        .map_err(ServiceError::from_sqlx_for_write)?;

        #[derive(sqlx::FromRow)]
        struct JobForFinalize {
            status: JobStatus,
            cron_expression: String,
            timezone: String,
        }

        let job: JobForFinalize = sqlx::query_as(
            "SELECT status, cron_expression, timezone FROM jobs WHERE id = $1 FOR UPDATE",
        )
        .bind(job_id.0)
        .fetch_one(&mut *tx)
        .await
        .map_err(ServiceError::from_sqlx_for_write)?;

        let next_execution = if job.status == JobStatus::Active {
            let cron_expr = CronExpression::parse(&job.cron_expression)?;
            let tz = parse_timezone(&job.timezone)?;
            Some(cron_expr.next_fire_after(tz, Utc::now())?)
        } else {
            None
        };

        if outcome.increments_failure_count() {
            sqlx::query(
                "UPDATE jobs SET failure_count = failure_count + 1, last_execution = NOW(), \
                 next_execution = $2, updated_at = NOW() WHERE id = $1",
            )
            .bind(job_id.0)
            .bind(next_execution)
            .execute(&mut *tx)
            .await
            .map_err(ServiceError::from_sqlx_for_write)?;
        } else {
            sqlx::query(
                "UPDATE jobs SET success_count = success_count + 1, last_execution = NOW(), \
                 next_execution = $2, updated_at = NOW() WHERE id = $1",
            )
            .bind(job_id.0)
            .bind(next_execution)
            .execute(&mut *tx)
            .await
            .map_err(ServiceError::from_sqlx_for_write)?;
        }

        tx.commit().await.map_err(ServiceError::from_sqlx_for_write)?;
        Ok(())
    }

    /// Rows stuck in `running` from a process that died mid-invocation.
    pub async fn list_orphaned_running(pool: &PgPool, process_start: DateTime<Utc>) -> Result<Vec<ExecutionId>> {
        let rows: Vec<(ExecutionId,)> = sqlx::query_as(
            "SELECT id FROM job_executions WHERE status = 'running' AND executed_at < $1",
        )
        .bind(process_start)
        .fetch_all(pool)
        .await
        .map_err(ServiceError::Database)?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn prune(pool: &PgPool, older_than: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM job_executions WHERE executed_at < $1")
            .bind(older_than)
            .execute(pool)
            .await
            .map_err(ServiceError::from_sqlx_for_write)?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_crashed_outcome_has_no_response_fields() {
        let outcome = ExecutionOutcome::worker_crashed();
        assert_eq!(outcome.status, ExecutionStatus::Failed);
        assert_eq!(outcome.error_message.as_deref(), Some("worker_crashed"));
        assert!(outcome.response_code.is_none());
        assert!(outcome.increments_failure_count());
    }

    #[test]
    fn success_outcome_does_not_increment_failure_count() {
        let outcome = ExecutionOutcome {
            status: ExecutionStatus::Success,
            duration_ms: 42,
            response_code: Some(200),
            response_body: Some("ok".to_string()),
            response_headers: None,
            error_message: None,
        };
        assert!(!outcome.increments_failure_count());
    }

    #[test]
    fn cancelled_outcome_increments_failure_count() {
        assert!(ExecutionOutcome::cancelled().increments_failure_count());
    }
}
