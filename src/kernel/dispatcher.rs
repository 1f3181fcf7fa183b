//! The dispatcher: keeps the live set of armed jobs, fires each at its
//! scheduled instants, and persists outcomes via the repository. One
//! long-lived task per armed job is the serialization mechanism for
//! scheduled firings — a job's task only loops back to sleep once its
//! current firing has fully recorded its outcome, so there is never more
//! than one in-flight scheduled invocation for a given job without any
//! extra bookkeeping to enforce it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{Notify, Semaphore};

use crate::common::entity_ids::{JobId, UserId};
use crate::common::{Result, ServiceError};
use crate::cron::{parse_timezone, CronExpression};
use crate::domains::jobs::{ExecutionOutcome, Job, JobStatus, TriggeredBy};

use super::invoker::{InvocationRequest, Invoker};

const RETRY_BACKOFFS_MS: [u64; 3] = [50, 200, 500];
const MISSED_FIRE_LOG_CAP: u32 = 10_000;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub max_concurrent_firings: Option<usize>,
}

struct ArmedJob {
    removed: Arc<AtomicBool>,
    wake: Arc<Notify>,
    handle: tokio::task::JoinHandle<()>,
}

#[derive(Debug, Clone, Copy)]
pub struct DispatcherStats {
    pub armed_count: usize,
    pub started_at: DateTime<Utc>,
    pub last_reconciliation: Option<DateTime<Utc>>,
}

/// Bounds how many waiters may queue for a firing permit before new
/// arrivals are dropped outright, per the `max_concurrent_firings` queueing
/// policy. Not separately configurable; a generous multiple of the
/// concurrency cap itself.
const QUEUE_DEPTH_MULTIPLIER: usize = 8;

struct FiringLimiter {
    semaphore: Option<Arc<Semaphore>>,
    waiting: Arc<AtomicUsize>,
    queue_depth: usize,
}

impl FiringLimiter {
    fn new(max_concurrent: Option<usize>) -> Self {
        let (semaphore, queue_depth) = match max_concurrent {
            Some(n) => (Some(Arc::new(Semaphore::new(n))), n.max(1) * QUEUE_DEPTH_MULTIPLIER),
            None => (None, 0),
        };
        Self {
            semaphore,
            waiting: Arc::new(AtomicUsize::new(0)),
            queue_depth,
        }
    }
}

enum FiringSlot {
    Unbounded,
    Permit(tokio::sync::OwnedSemaphorePermit),
    Rejected,
}

impl FiringLimiter {
    async fn try_acquire_or_reject(&self, job_id: JobId) -> FiringSlot {
        let Some(semaphore) = self.semaphore.clone() else {
            return FiringSlot::Unbounded;
        };

        if semaphore.available_permits() == 0 {
            let waiting = self.waiting.fetch_add(1, Ordering::AcqRel) + 1;
            if waiting > self.queue_depth {
                self.waiting.fetch_sub(1, Ordering::AcqRel);
                tracing::warn!(job_id = %job_id, "firing queue full, dropping firing");
                return FiringSlot::Rejected;
            }
            let permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
            self.waiting.fetch_sub(1, Ordering::AcqRel);
            return FiringSlot::Permit(permit);
        }

        match semaphore.acquire_owned().await {
            Ok(permit) => FiringSlot::Permit(permit),
            Err(_) => FiringSlot::Unbounded,
        }
    }
}

struct DispatcherContext {
    pool: sqlx::PgPool,
    invoker: Arc<Invoker>,
    limiter: FiringLimiter,
    force_cancel: Arc<Notify>,
    in_flight: Arc<AtomicUsize>,
    shutting_down: Arc<AtomicBool>,
}

pub struct Dispatcher {
    ctx: Arc<DispatcherContext>,
    live: Mutex<HashMap<JobId, ArmedJob>>,
    started_at: DateTime<Utc>,
    last_reconciliation_epoch_ms: Arc<AtomicI64>,
}

impl Dispatcher {
    pub fn new(pool: sqlx::PgPool, invoker: Invoker, config: DispatcherConfig) -> Self {
        let ctx = DispatcherContext {
            pool,
            invoker: Arc::new(invoker),
            limiter: FiringLimiter::new(config.max_concurrent_firings),
            force_cancel: Arc::new(Notify::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
            shutting_down: Arc::new(AtomicBool::new(false)),
        };
        Self {
            ctx: Arc::new(ctx),
            live: Mutex::new(HashMap::new()),
            started_at: Utc::now(),
            last_reconciliation_epoch_ms: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Load the job via the repository; if active, arm it. If already
    /// armed, disarm first so the new arming wins (used by `UpdateJob`).
    pub async fn add_job(&self, id: JobId) -> Result<()> {
        if self.ctx.shutting_down.load(Ordering::Acquire) {
            return Ok(());
        }

        self.remove_job(id);

        let job = Job::find_by_id_unscoped(&self.ctx.pool, id).await?;
        if let Some(job) = job {
            if job.status == JobStatus::Active {
                if let Some(next) = job.next_execution {
                    self.arm(id, next);
                }
            }
        }
        Ok(())
    }

    pub fn remove_job(&self, id: JobId) {
        let mut live = self.live.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(armed) = live.remove(&id) {
            armed.removed.store(true, Ordering::Release);
            armed.wake.notify_one();
        }
    }

    fn arm(&self, id: JobId, next_execution: DateTime<Utc>) {
        let removed = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());
        let ctx = self.ctx.clone();
        let task_removed = removed.clone();
        let task_wake = wake.clone();

        let handle = tokio::spawn(async move {
            run_armed_job(ctx, id, next_execution, task_removed, task_wake).await;
        });

        let mut live = self.live.lock().unwrap_or_else(|e| e.into_inner());
        live.insert(id, ArmedJob { removed, wake, handle });
    }

    /// Run the firing sequence once, immediately, outside the per-job
    /// serialized loop: concurrent manual triggers may overlap a scheduled
    /// firing by design (see design notes on manual-trigger overlap).
    pub async fn trigger(&self, user_id: UserId, id: JobId) -> Result<crate::common::entity_ids::ExecutionId> {
        let job = Job::find_by_id(&self.ctx.pool, user_id, id).await?;
        fire_once(&self.ctx, &job, TriggeredBy::Manual).await
    }

    pub async fn shutdown(&self, deadline: Duration) {
        let deadline = deadline.min(Duration::from_secs(30));
        self.ctx.shutting_down.store(true, Ordering::Release);

        let start = Instant::now();
        while self.ctx.in_flight.load(Ordering::Acquire) > 0 && start.elapsed() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        if self.ctx.in_flight.load(Ordering::Acquire) > 0 {
            tracing::warn!("shutdown deadline reached with in-flight firings, forcing cancellation");
        }

        // Broadcast unconditionally rather than gating on the check above: a
        // firing can start in the gap between that check and this line (it
        // only refuses to start once it observes `shutting_down`, which is
        // set but not synchronized against), and it still needs to see this
        // notification instead of being aborted mid-invocation below.
        self.ctx.force_cancel.notify_waiters();

        let cancel_grace = Instant::now();
        while self.ctx.in_flight.load(Ordering::Acquire) > 0 && cancel_grace.elapsed() < Duration::from_secs(1) {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let mut live = self.live.lock().unwrap_or_else(|e| e.into_inner());
        for (_, armed) in live.drain() {
            armed.removed.store(true, Ordering::Release);
            armed.wake.notify_one();
            armed.handle.abort();
        }
    }

    pub fn stats(&self) -> DispatcherStats {
        let armed_count = self.live.lock().unwrap_or_else(|e| e.into_inner()).len();
        let last_ms = self.last_reconciliation_epoch_ms.load(Ordering::Acquire);
        let last_reconciliation = if last_ms == 0 {
            None
        } else {
            DateTime::from_timestamp_millis(last_ms)
        };
        DispatcherStats {
            armed_count,
            started_at: self.started_at,
            last_reconciliation,
        }
    }

    pub fn record_reconciliation(&self, at: DateTime<Utc>) {
        self.last_reconciliation_epoch_ms.store(at.timestamp_millis(), Ordering::Release);
    }

    pub fn armed_job_ids(&self) -> Vec<JobId> {
        self.live.lock().unwrap_or_else(|e| e.into_inner()).keys().copied().collect()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.ctx.shutting_down.load(Ordering::Acquire)
    }
}

async fn run_armed_job(
    ctx: Arc<DispatcherContext>,
    job_id: JobId,
    mut next_execution: DateTime<Utc>,
    removed: Arc<AtomicBool>,
    wake: Arc<Notify>,
) {
    loop {
        if removed.load(Ordering::Acquire) {
            return;
        }

        let now = Utc::now();
        let sleep_for = (next_execution - now).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {}
            _ = wake.notified() => {
                continue;
            }
        }

        if removed.load(Ordering::Acquire) {
            return;
        }

        if ctx.shutting_down.load(Ordering::Acquire) {
            return;
        }

        let scheduled_for = next_execution;

        match ctx.limiter.try_acquire_or_reject(job_id).await {
            FiringSlot::Rejected => {
                tracing::warn!(job_id = %job_id, "firing dropped: max_concurrent_firings queue overflow");
                match refetch_status_and_next(&ctx, job_id).await {
                    Some(next) => {
                        next_execution = next;
                        continue;
                    }
                    None => return,
                }
            }
            slot => {
                if ctx.shutting_down.load(Ordering::Acquire) {
                    return;
                }

                let job = match Job::find_by_id_unscoped(&ctx.pool, job_id).await {
                    Ok(Some(job)) if job.status == JobStatus::Active => job,
                    Ok(_) => return,
                    Err(err) => {
                        tracing::error!(job_id = %job_id, error = %err, "failed to load job for firing");
                        return;
                    }
                };

                log_missed_fires(&job, scheduled_for);

                match fire_once(&ctx, &job, TriggeredBy::Cron).await {
                    Ok(_) => {}
                    Err(err) => {
                        tracing::error!(job_id = %job_id, error = %err, "firing failed");
                    }
                }
                drop(slot);

                match refetch_status_and_next(&ctx, job_id).await {
                    Some(next) => next_execution = next,
                    None => return,
                }
            }
        }
    }
}

async fn refetch_status_and_next(ctx: &DispatcherContext, job_id: JobId) -> Option<DateTime<Utc>> {
    match Job::find_by_id_unscoped(&ctx.pool, job_id).await {
        Ok(Some(job)) if job.status == JobStatus::Active => job.next_execution,
        _ => None,
    }
}

fn log_missed_fires(job: &Job, scheduled_for: DateTime<Utc>) {
    let now = Utc::now();
    if now - scheduled_for < chrono::Duration::seconds(1) {
        return;
    }
    let Ok(cron_expr) = CronExpression::parse(&job.cron_expression) else {
        return;
    };
    let Ok(tz) = parse_timezone(&job.timezone) else {
        return;
    };

    let mut missed = 0u32;
    let mut cursor = scheduled_for;
    while missed < MISSED_FIRE_LOG_CAP {
        match cron_expr.next_fire_after(tz, cursor) {
            Ok(next) if next < now => {
                missed += 1;
                cursor = next;
            }
            _ => break,
        }
    }
    if missed > 0 {
        tracing::warn!(job_id = %job.id, missed, "dispatcher fell behind, skipped to most recent firing");
    }
}

async fn fire_once(
    ctx: &DispatcherContext,
    job: &Job,
    triggered_by: TriggeredBy,
) -> Result<crate::common::entity_ids::ExecutionId> {
    use crate::domains::jobs::JobExecution;

    ctx.in_flight.fetch_add(1, Ordering::AcqRel);
    let _guard = InFlightGuard(&ctx.in_flight);

    let exec_id = JobExecution::record_start(&ctx.pool, job.id, triggered_by).await?;

    let request = InvocationRequest {
        method: job.method,
        url: job.url.clone(),
        headers: job.headers.clone(),
        body: job.body.clone(),
    };

    let outcome = tokio::select! {
        outcome = ctx.invoker.invoke(&request) => outcome,
        _ = ctx.force_cancel.notified() => ExecutionOutcome::cancelled(),
    };

    record_end_with_retry(&ctx.pool, exec_id, outcome).await?;
    Ok(exec_id)
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Retries the finalization transaction (never the HTTP call) on a
/// concurrency conflict, preserving the already-captured response data.
async fn record_end_with_retry(
    pool: &sqlx::PgPool,
    exec_id: crate::common::entity_ids::ExecutionId,
    outcome: ExecutionOutcome,
) -> Result<()> {
    use crate::domains::jobs::JobExecution;

    let mut attempt = 0usize;
    loop {
        match JobExecution::record_end(pool, exec_id, outcome.clone()).await {
            Ok(()) => return Ok(()),
            Err(ServiceError::Concurrency(msg)) => {
                if attempt >= RETRY_BACKOFFS_MS.len() {
                    tracing::error!(exec_id = %exec_id, error = %msg, "giving up finalizing execution after retries");
                    return Err(ServiceError::Concurrency(msg));
                }
                tokio::time::sleep(Duration::from_millis(RETRY_BACKOFFS_MS[attempt])).await;
                attempt += 1;
            }
            Err(other) => return Err(other),
        }
    }
}
