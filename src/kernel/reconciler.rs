//! The reconciler: the three background tasks that keep the
//! dispatcher's live set honest and the execution history bounded, plus
//! the once-a-minute health snapshot.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;

use crate::common::entity_ids::JobId;
use crate::domains::jobs::{ExecutionOutcome, Job, JobExecution};

use super::dispatcher::Dispatcher;
use super::health::{HealthSnapshot, HealthState};

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub live_set_interval: Duration,
    pub prune_interval: Duration,
    pub execution_retention: Duration,
    pub health_interval: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            live_set_interval: Duration::from_secs(5 * 60),
            prune_interval: Duration::from_secs(60 * 60),
            execution_retention: Duration::from_secs(30 * 24 * 60 * 60),
            health_interval: Duration::from_secs(60),
        }
    }
}

pub struct Reconciler {
    pool: sqlx::PgPool,
    dispatcher: Arc<Dispatcher>,
    config: ReconcilerConfig,
    process_start: chrono::DateTime<Utc>,
    health_tx: watch::Sender<HealthSnapshot>,
}

impl Reconciler {
    pub fn new(pool: sqlx::PgPool, dispatcher: Arc<Dispatcher>, config: ReconcilerConfig) -> Self {
        let process_start = Utc::now();
        let (health_tx, _) = watch::channel(HealthSnapshot {
            state: HealthState::Unhealthy,
            uptime: Duration::ZERO,
            armed_job_count: 0,
            memory_rss_bytes: current_rss_bytes(),
            reconciliation_lag: Duration::ZERO,
            taken_at: process_start,
        });
        Self {
            pool,
            dispatcher,
            config,
            process_start,
            health_tx,
        }
    }

    pub fn health_receiver(&self) -> watch::Receiver<HealthSnapshot> {
        self.health_tx.subscribe()
    }

    /// Reclaim job executions left `running` by a process that died
    /// mid-firing. Startup only — a live process's own executions are
    /// never orphaned by definition.
    pub async fn reclaim_orphaned_on_startup(&self) {
        match JobExecution::list_orphaned_running(&self.pool, self.process_start).await {
            Ok(orphaned) => {
                for exec_id in orphaned {
                    if let Err(err) =
                        JobExecution::record_end(&self.pool, exec_id, ExecutionOutcome::worker_crashed()).await
                    {
                        tracing::error!(exec_id = %exec_id, error = %err, "failed to reclaim orphaned execution");
                    }
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to list orphaned executions on startup");
            }
        }
    }

    /// Build the live set from every active job (startup call, prior to
    /// entering the periodic loop).
    pub async fn reconcile_live_set_once(&self) {
        let active = match Job::list_active(&self.pool).await {
            Ok(jobs) => jobs,
            Err(err) => {
                tracing::error!(error = %err, "failed to list active jobs for reconciliation");
                return;
            }
        };

        let active_ids: HashSet<JobId> = active.iter().map(|job| job.id).collect();
        let armed_ids: HashSet<JobId> = self.dispatcher.armed_job_ids().into_iter().collect();

        for id in armed_ids.difference(&active_ids) {
            self.dispatcher.remove_job(*id);
        }

        for id in active_ids.difference(&armed_ids) {
            if let Err(err) = self.dispatcher.add_job(*id).await {
                tracing::error!(job_id = %id, error = %err, "failed to arm job during reconciliation");
            }
        }

        self.dispatcher.record_reconciliation(Utc::now());
    }

    async fn prune_once(&self) {
        let cutoff = Utc::now() - chrono::Duration::from_std(self.config.execution_retention).unwrap_or_default();
        match JobExecution::prune(&self.pool, cutoff).await {
            Ok(deleted) if deleted > 0 => {
                tracing::info!(deleted, "pruned expired job executions");
            }
            Ok(_) => {}
            Err(err) => {
                tracing::error!(error = %err, "failed to prune job executions");
            }
        }
    }

    fn take_snapshot(&self) -> HealthSnapshot {
        let stats = self.dispatcher.stats();
        let now = Utc::now();
        let lag = stats
            .last_reconciliation
            .map(|last| (now - last).to_std().unwrap_or(Duration::ZERO))
            .unwrap_or(Duration::ZERO);

        let state = if self.dispatcher.is_shutting_down() {
            HealthState::Unhealthy
        } else {
            HealthState::Healthy
        };

        HealthSnapshot {
            state,
            uptime: (now - self.process_start).to_std().unwrap_or(Duration::ZERO),
            armed_job_count: stats.armed_count,
            memory_rss_bytes: current_rss_bytes(),
            reconciliation_lag: lag,
            taken_at: now,
        }
    }

    /// Run the periodic reconciliation, pruning, and health-snapshot
    /// loops until `shutdown` resolves. Intended to be spawned once at
    /// startup, after `reclaim_orphaned_on_startup` and
    /// `reconcile_live_set_once` have already run.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut live_set_tick = tokio::time::interval(self.config.live_set_interval);
        let mut prune_tick = tokio::time::interval(self.config.prune_interval);
        let mut health_tick = tokio::time::interval(self.config.health_interval);

        loop {
            tokio::select! {
                _ = live_set_tick.tick() => self.reconcile_live_set_once().await,
                _ = prune_tick.tick() => self.prune_once().await,
                _ = health_tick.tick() => {
                    let snapshot = self.take_snapshot();
                    let _ = self.health_tx.send(snapshot);
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }
}

/// Best-effort resident set size from `/proc/self/status`. `None` off
/// Linux or if the file is unreadable; this is an observability signal,
/// never load-bearing.
fn current_rss_bytes() -> Option<u64> {
    let contents = std::fs::read_to_string("/proc/self/status").ok()?;
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let kb: u64 = rest.trim().trim_end_matches(" kB").trim().parse().ok()?;
            return Some(kb * 1024);
        }
    }
    None
}
