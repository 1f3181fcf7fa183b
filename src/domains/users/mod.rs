//! User entity (ownership only). See [`model::User`].

pub mod model;

pub use model::{AccountStatus, User};
