//! Core scheduler/executor for the cron service.
//!
//! This crate is the durable job/execution model plus the in-process
//! dispatcher that arms active jobs, fires them at their computed instants,
//! and records outcomes. The HTTP API, authentication, and frontend are
//! external collaborators that consume [`kernel::control`] and
//! [`domains::jobs`].

pub mod common;
pub mod config;
pub mod cron;
pub mod domains;
pub mod kernel;

pub use config::Config;
