//! Typed ID aliases for the entities in this core: users, jobs, and
//! job executions.

pub use super::id::Id;

/// Marker type for User entities (ownership only; see [`crate::domains::users`]).
pub struct User;

/// Marker type for Job entities.
pub struct Job;

/// Marker type for JobExecution entities.
pub struct Execution;

pub type UserId = Id<User>;
pub type JobId = Id<Job>;
pub type ExecutionId = Id<Execution>;
