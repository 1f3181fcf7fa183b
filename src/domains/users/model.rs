//! The user entity, referenced by jobs for ownership only. Account creation,
//! password hashing, and session issuance belong to the authentication
//! collaborator; this repository only needs to read a user row to confirm it
//! is usable as an owner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::common::entity_ids::UserId;
use crate::common::{ServiceError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "account_status", rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Suspended,
    Deleted,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub account_status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Look up a user by id. The core only needs this to validate a job's
    /// owner still exists; it never creates, updates, or deletes users.
    pub async fn find_by_id(pool: &PgPool, id: UserId) -> Result<User> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, account_status, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(ServiceError::Database)?
        .ok_or(ServiceError::NotFound)
    }
}
