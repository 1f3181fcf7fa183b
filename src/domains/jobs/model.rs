//! The job entity: request template, schedule, lifecycle state, and
//! bookkeeping counters. Repository operations are static methods taking a
//! pool, mirroring the rest of this codebase's domain modules rather than
//! wrapping a connection in a repository struct.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use typed_builder::TypedBuilder;

use crate::common::entity_ids::{JobId, UserId};
use crate::common::pagination::ValidatedPage;
use crate::common::{Headers, Result, ServiceError};
use crate::cron::{parse_timezone, CronExpression};

const NAME_MAX_LEN: usize = 100;
const DESCRIPTION_MAX_LEN: usize = 500;
const BODY_MAX_LEN: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "http_method", rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl Default for HttpMethod {
    fn default() -> Self {
        Self::Get
    }
}

impl HttpMethod {
    /// True for methods the invoker sends a body with.
    pub fn carries_body(&self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
pub enum JobStatus {
    Active,
    Paused,
    Deleted,
}

/// A job as persisted and returned by the repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub user_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub url: String,
    pub method: HttpMethod,
    pub headers: Headers,
    pub body: Option<String>,
    pub cron_expression: String,
    pub timezone: String,
    pub status: JobStatus,
    pub success_count: i64,
    pub failure_count: i64,
    pub last_execution: Option<DateTime<Utc>>,
    pub next_execution: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Raw row shape: `headers` comes back from Postgres as JSONB, decoded via
/// `sqlx::types::Json` and unwrapped into the domain's `Headers` type.
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: JobId,
    user_id: UserId,
    name: String,
    description: Option<String>,
    url: String,
    method: HttpMethod,
    headers: sqlx::types::Json<Headers>,
    body: Option<String>,
    cron_expression: String,
    timezone: String,
    status: JobStatus,
    success_count: i64,
    failure_count: i64,
    last_execution: Option<DateTime<Utc>>,
    next_execution: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        Job {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            description: row.description,
            url: row.url,
            method: row.method,
            headers: row.headers.0,
            body: row.body,
            cron_expression: row.cron_expression,
            timezone: row.timezone,
            status: row.status,
            success_count: row.success_count,
            failure_count: row.failure_count,
            last_execution: row.last_execution,
            next_execution: row.next_execution,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const JOB_COLUMNS: &str = "id, user_id, name, description, url, method, headers, body, \
    cron_expression, timezone, status, success_count, failure_count, last_execution, \
    next_execution, created_at, updated_at";

#[derive(Debug, Clone, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct CreateJobParams {
    pub name: String,
    #[builder(default, setter(strip_option))]
    pub description: Option<String>,
    pub url: String,
    #[builder(default)]
    pub method: HttpMethod,
    #[builder(default)]
    pub headers: Headers,
    #[builder(default, setter(strip_option))]
    pub body: Option<String>,
    pub cron_expression: String,
    #[builder(default = "UTC".to_string())]
    pub timezone: String,
}

#[derive(Debug, Clone, Default, TypedBuilder)]
#[builder(field_defaults(default, setter(into, strip_option)))]
pub struct UpdateJobParams {
    pub name: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub method: Option<HttpMethod>,
    pub headers: Option<Headers>,
    pub body: Option<String>,
    pub cron_expression: Option<String>,
    pub timezone: Option<String>,
    pub status: Option<JobStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct JobListFilter {
    pub status: Option<JobStatus>,
    pub search: Option<String>,
}

fn validate_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.chars().count() > NAME_MAX_LEN {
        return Err(ServiceError::validation(format!(
            "name must be 1-{NAME_MAX_LEN} characters after trimming"
        )));
    }
    Ok(trimmed.to_string())
}

fn validate_description(description: Option<&str>) -> Result<()> {
    if let Some(d) = description {
        if d.chars().count() > DESCRIPTION_MAX_LEN {
            return Err(ServiceError::validation(format!(
                "description must be at most {DESCRIPTION_MAX_LEN} characters"
            )));
        }
    }
    Ok(())
}

fn validate_url(url: &str) -> Result<()> {
    let parsed = url::Url::parse(url).map_err(|e| ServiceError::validation(format!("invalid url: {e}")))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ServiceError::validation("url scheme must be http or https"));
    }
    Ok(())
}

fn validate_body(body: Option<&str>) -> Result<()> {
    if let Some(b) = body {
        if b.chars().count() > BODY_MAX_LEN {
            return Err(ServiceError::validation(format!(
                "body must be at most {BODY_MAX_LEN} characters"
            )));
        }
    }
    Ok(())
}

impl Job {
    pub async fn create(pool: &PgPool, user_id: UserId, params: CreateJobParams) -> Result<Job> {
        let name = validate_name(&params.name)?;
        validate_description(params.description.as_deref())?;
        validate_url(&params.url)?;
        validate_body(params.body.as_deref())?;

        let cron_expr = CronExpression::parse(&params.cron_expression)?;
        let tz = parse_timezone(&params.timezone)?;
        let next_execution = cron_expr.next_fire_after(tz, Utc::now())?;

        let row: JobRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO jobs (
                user_id, name, description, url, method, headers, body,
                cron_expression, timezone, status, next_execution
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'active', $10)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(name)
        .bind(params.description)
        .bind(params.url)
        .bind(params.method)
        .bind(sqlx::types::Json(params.headers))
        .bind(params.body)
        .bind(cron_expr.as_str())
        .bind(&params.timezone)
        .bind(next_execution)
        .fetch_one(pool)
        .await
        .map_err(ServiceError::from_sqlx_for_write)?;

        Ok(Job::from(row))
    }

    pub async fn find_by_id(pool: &PgPool, user_id: UserId, id: JobId) -> Result<Job> {
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1 AND user_id = $2 AND status <> 'deleted'"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(ServiceError::Database)?;

        row.map(Job::from).ok_or(ServiceError::NotFound)
    }

    /// Unscoped by user and visible regardless of status. Only the
    /// dispatcher and reconciler call this — it is how the live set is kept
    /// in sync with out-of-process changes; it is not part of the
    /// user-facing contract and must never be reachable from the API layer.
    pub async fn find_by_id_unscoped(pool: &PgPool, id: JobId) -> Result<Option<Job>> {
        let row: Option<JobRow> = sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(ServiceError::Database)?;

        Ok(row.map(Job::from))
    }

    pub async fn list(
        pool: &PgPool,
        user_id: UserId,
        filter: JobListFilter,
        page: ValidatedPage,
    ) -> Result<(Vec<Job>, i64)> {
        let pattern = filter.search.as_ref().map(|s| format!("%{}%", s.to_lowercase()));

        let mut count_qb = sqlx::QueryBuilder::new("SELECT COUNT(*) FROM jobs WHERE user_id = ");
        count_qb.push_bind(user_id);
        count_qb.push(" AND status <> 'deleted'");
        if let Some(status) = filter.status {
            count_qb.push(" AND status = ");
            count_qb.push_bind(status);
        }
        if let Some(pattern) = &pattern {
            count_qb.push(" AND (lower(name) LIKE ");
            count_qb.push_bind(pattern.clone());
            count_qb.push(" OR lower(url) LIKE ");
            count_qb.push_bind(pattern.clone());
            count_qb.push(")");
        }
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(pool)
            .await
            .map_err(ServiceError::Database)?;

        let mut qb = sqlx::QueryBuilder::new(format!("SELECT {JOB_COLUMNS} FROM jobs WHERE user_id = "));
        qb.push_bind(user_id);
        qb.push(" AND status <> 'deleted'");
        if let Some(status) = filter.status {
            qb.push(" AND status = ");
            qb.push_bind(status);
        }
        if let Some(pattern) = &pattern {
            qb.push(" AND (lower(name) LIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" OR lower(url) LIKE ");
            qb.push_bind(pattern.clone());
            qb.push(")");
        }
        qb.push(" ORDER BY ");
        qb.push(page.sort_by.order_by_clause());
        qb.push(" LIMIT ");
        qb.push_bind(page.fetch_limit());
        qb.push(" OFFSET ");
        qb.push_bind(page.offset());

        let rows: Vec<JobRow> = qb
            .build_query_as()
            .fetch_all(pool)
            .await
            .map_err(ServiceError::Database)?;

        Ok((rows.into_iter().map(Job::from).collect(), total))
    }

    pub async fn update(pool: &PgPool, user_id: UserId, id: JobId, patch: UpdateJobParams) -> Result<Job> {
        if let Some(name) = &patch.name {
            validate_name(name)?;
        }
        validate_description(patch.description.as_deref())?;
        if let Some(url) = &patch.url {
            validate_url(url)?;
        }
        validate_body(patch.body.as_deref())?;

        let current = Self::find_by_id(pool, user_id, id).await?;

        let effective_cron = patch.cron_expression.as_deref().unwrap_or(&current.cron_expression);
        let effective_tz = patch.timezone.as_deref().unwrap_or(&current.timezone);
        let cron_or_tz_changed = patch.cron_expression.is_some() || patch.timezone.is_some();

        let cron_expr = CronExpression::parse(effective_cron)?;
        let tz = parse_timezone(effective_tz)?;
        let new_status = patch.status.unwrap_or(current.status);

        let next_execution = if new_status != JobStatus::Active {
            None
        } else if cron_or_tz_changed || current.status != JobStatus::Active {
            Some(cron_expr.next_fire_after(tz, Utc::now())?)
        } else {
            current.next_execution
        };

        let row: Option<JobRow> = sqlx::query_as(&format!(
            r#"
            UPDATE jobs SET
                name = COALESCE($3, name),
                description = COALESCE($4, description),
                url = COALESCE($5, url),
                method = COALESCE($6, method),
                headers = COALESCE($7, headers),
                body = COALESCE($8, body),
                cron_expression = COALESCE($9, cron_expression),
                timezone = COALESCE($10, timezone),
                status = COALESCE($11, status),
                next_execution = $12,
                updated_at = NOW()
            WHERE id = $1 AND user_id = $2 AND status <> 'deleted'
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(user_id)
        .bind(&patch.name)
        .bind(&patch.description)
        .bind(&patch.url)
        .bind(patch.method)
        .bind(patch.headers.map(sqlx::types::Json))
        .bind(&patch.body)
        .bind(&patch.cron_expression)
        .bind(&patch.timezone)
        .bind(patch.status)
        .bind(next_execution)
        .fetch_optional(pool)
        .await
        .map_err(ServiceError::from_sqlx_for_write)?;

        row.map(Job::from).ok_or(ServiceError::NotFound)
    }

    /// Soft delete. Idempotent: calling this on an already-deleted (or
    /// never-owned) job is a no-op rather than an error.
    pub async fn delete(pool: &PgPool, user_id: UserId, id: JobId) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET status = 'deleted', next_execution = NULL, updated_at = NOW() \
             WHERE id = $1 AND user_id = $2 AND status <> 'deleted'",
        )
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await
        .map_err(ServiceError::from_sqlx_for_write)?;

        Ok(())
    }

    /// Flip active <-> paused. Deleted jobs are not toggleable.
    pub async fn toggle(pool: &PgPool, user_id: UserId, id: JobId) -> Result<Job> {
        let current = Self::find_by_id(pool, user_id, id).await?;

        let (new_status, next_execution) = match current.status {
            JobStatus::Active => (JobStatus::Paused, None),
            JobStatus::Paused => {
                let cron_expr = CronExpression::parse(&current.cron_expression)?;
                let tz = parse_timezone(&current.timezone)?;
                (JobStatus::Active, Some(cron_expr.next_fire_after(tz, Utc::now())?))
            }
            JobStatus::Deleted => return Err(ServiceError::NotFound),
        };

        let row: Option<JobRow> = sqlx::query_as(&format!(
            r#"
            UPDATE jobs SET status = $3, next_execution = $4, updated_at = NOW()
            WHERE id = $1 AND user_id = $2 AND status <> 'deleted'
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(user_id)
        .bind(new_status)
        .bind(next_execution)
        .fetch_optional(pool)
        .await
        .map_err(ServiceError::from_sqlx_for_write)?;

        row.map(Job::from).ok_or(ServiceError::NotFound)
    }

    /// Global, unscoped by user: the reconciler's view of the authoritative
    /// live set.
    pub async fn list_active(pool: &PgPool) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> =
            sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE status = 'active'"))
                .fetch_all(pool)
                .await
                .map_err(ServiceError::Database)?;

        Ok(rows.into_iter().map(Job::from).collect())
    }
}
