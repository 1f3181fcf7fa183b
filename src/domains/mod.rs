//! Domain entities: the durable job/execution model plus the user
//! entity jobs are scoped by.

pub mod jobs;
pub mod users;
