pub mod kv;
pub mod memory;
pub mod users;

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;

use crate::models::user::{NewUser, Role, User, UserChanges, UserFilter};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness or reference constraint rejected the write.
    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("key-value store error: {0}")]
    KeyValue(#[from] redis::RedisError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistent user and role records.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>>;
    async fn update_password(&self, id: i64, password_hash: &str) -> StoreResult<()>;

    async fn list_users(&self, filter: &UserFilter) -> StoreResult<Vec<User>>;
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;
    async fn update_user(&self, id: i64, changes: UserChanges) -> StoreResult<Option<User>>;
    async fn delete_user(&self, id: i64) -> StoreResult<bool>;

    async fn list_roles(&self) -> StoreResult<Vec<Role>>;
    async fn find_role(&self, id: i64) -> StoreResult<Option<Role>>;
    async fn create_role(&self, name: &str) -> StoreResult<Role>;
    async fn update_role(&self, id: i64, name: &str) -> StoreResult<Option<Role>>;
    async fn delete_role(&self, id: i64) -> StoreResult<bool>;
}

/// Expiring string store with atomic create-if-absent.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;

    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Writes `value` only if `key` is absent. Returns whether the write happened.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool>;

    /// Returns whether a live key was removed.
    async fn del(&self, key: &str) -> StoreResult<bool>;
}

pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Run the migrations embedded in ./migrations/
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
