//! The health snapshot emitted once a minute by the reconciler. This is an
//! observability signal only — nothing reads it to make scheduling
//! decisions.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    pub state: HealthState,
    pub uptime: std::time::Duration,
    pub armed_job_count: usize,
    pub memory_rss_bytes: Option<u64>,
    pub reconciliation_lag: std::time::Duration,
    pub taken_at: DateTime<Utc>,
}

impl HealthSnapshot {
    pub fn is_healthy(&self) -> bool {
        self.state == HealthState::Healthy
    }
}
