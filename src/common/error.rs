//! The error taxonomy surfaced by the core.
//!
//! The API-layer collaborator maps each variant to a user-visible status
//! code; nothing below should ever need a catch-all. `InvocationFailure`
//! (a non-2xx/timeout/etc. outcome of an HTTP invocation) is deliberately
//! *not* an error here: the invoker returns it as data in an execution row,
//! never as an `Err`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// Input rejected by the repository or the cron evaluator. Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// Ownership or soft-delete check failed.
    #[error("not found")]
    NotFound,

    /// Uniqueness violation (e.g. user email).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Repository transaction conflict. Retried internally a bounded number
    /// of times before being surfaced.
    #[error("concurrency error: {0}")]
    Concurrency(String),

    /// Evaluator or dispatcher invariant violation. The affected job is
    /// forcibly disarmed; the process continues.
    #[error("internal scheduler error: {0}")]
    SchedulerInternal(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ServiceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn concurrency(msg: impl Into<String>) -> Self {
        Self::Concurrency(msg.into())
    }

    pub fn scheduler_internal(msg: impl Into<String>) -> Self {
        Self::SchedulerInternal(msg.into())
    }

    /// A `sqlx::Error` is a `ConcurrencyError` iff it is a serialization or
    /// unique-violation failure that the caller should retry; everything
    /// else is a hard database error.
    pub fn from_sqlx_for_write(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            // Postgres: 40001 = serialization_failure, 40P01 = deadlock_detected
            if matches!(db_err.code().as_deref(), Some("40001") | Some("40P01")) {
                return Self::Concurrency(db_err.message().to_string());
            }
        }
        Self::Database(err)
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
