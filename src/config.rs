//! Application configuration loaded from environment variables.

use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

/// Runtime configuration for the scheduler/executor core.
///
/// All fields have the defaults named in the spec's configuration table;
/// anything DB-related is required, everything else is optional.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,

    /// Per-invocation deadline for the HTTP invoker.
    pub request_timeout: Duration,
    /// Truncation size for captured response bodies, in bytes.
    pub response_body_limit_bytes: usize,
    /// Age past which execution rows are pruned.
    pub execution_retention_days: i64,
    /// Period of the live-set reconciliation task.
    pub reconcile_interval: Duration,
    /// Period of the prune task.
    pub prune_interval: Duration,
    /// Max wait for in-flight firings on shutdown.
    pub shutdown_drain_deadline: Duration,
    /// Value sent when a job's request template does not specify one.
    pub user_agent: String,
    /// Optional global cap on concurrent in-flight firings.
    pub max_concurrent_firings: Option<usize>,
}

impl Config {
    /// Load configuration from environment variables, falling back to the
    /// spec-defined defaults for everything but `DATABASE_URL`.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development).
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            request_timeout: Duration::from_millis(env_u64("REQUEST_TIMEOUT_MS", 30_000)?),
            response_body_limit_bytes: env_u64("RESPONSE_BODY_LIMIT_BYTES", 10_240)? as usize,
            execution_retention_days: env_u64("EXECUTION_RETENTION_DAYS", 30)? as i64,
            reconcile_interval: Duration::from_millis(env_u64("RECONCILE_INTERVAL_MS", 300_000)?),
            prune_interval: Duration::from_millis(env_u64("PRUNE_INTERVAL_MS", 3_600_000)?),
            shutdown_drain_deadline: Duration::from_millis(
                env_u64("SHUTDOWN_DRAIN_DEADLINE_MS", 30_000)?.min(30_000),
            ),
            user_agent: env::var("CRON_USER_AGENT").unwrap_or_else(|_| "CronMaster/1.0".to_string()),
            max_concurrent_firings: env::var("MAX_CONCURRENT_FIRINGS")
                .ok()
                .map(|v| v.parse())
                .transpose()
                .context("MAX_CONCURRENT_FIRINGS must be a valid number")?,
        })
    }
}

fn env_u64(key: &str, default: u64) -> Result<u64> {
    match env::var(key) {
        Ok(v) => v.parse().with_context(|| format!("{key} must be a valid number")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_u64_falls_back_to_default() {
        std::env::remove_var("CRONMASTER_TEST_KEY_ABSENT");
        let v = env_u64("CRONMASTER_TEST_KEY_ABSENT", 42).unwrap();
        assert_eq!(v, 42);
    }
}
