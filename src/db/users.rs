use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use super::{StoreError, StoreResult, UserStore};
use crate::models::user::{NewUser, Role, User, UserChanges, UserFilter};

const SELECT_USER: &str = "SELECT u.id, u.name, u.email, u.password AS password_hash, u.phone,
        u.role_id, r.name AS role_name, u.active, u.avatar, u.created_at, u.updated_at
     FROM users u
     JOIN roles r ON r.id = u.role_id";

/// Row shape of `SELECT_USER`, flattened before the role is nested.
#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    name: String,
    email: String,
    password_hash: String,
    phone: Option<String>,
    role_id: i64,
    role_name: String,
    active: bool,
    avatar: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        User {
            id: r.id,
            name: r.name,
            email: r.email,
            password_hash: r.password_hash,
            phone: r.phone,
            role: Role {
                id: r.role_id,
                name: r.role_name,
            },
            active: r.active,
            avatar: r.avatar,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Translate constraint violations into `StoreError::Conflict` with a client-facing message.
fn constraint_error(e: sqlx::Error, unique_msg: &str, foreign_key_msg: &str) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StoreError::Conflict(unique_msg.to_string());
        }
        if db.is_foreign_key_violation() {
            return StoreError::Conflict(foreign_key_msg.to_string());
        }
    }
    StoreError::Database(e)
}

pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!("{SELECT_USER} WHERE u.email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!("{SELECT_USER} WHERE u.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> StoreResult<()> {
        sqlx::query("UPDATE users SET password = $1, updated_at = NOW() WHERE id = $2")
            .bind(password_hash)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_users(&self, filter: &UserFilter) -> StoreResult<Vec<User>> {
        let pattern = filter.search_term().map(|s| format!("%{s}%"));
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "{SELECT_USER}
             WHERE ($1::TEXT IS NULL OR r.name = $1)
               AND ($2::BOOL IS NULL OR u.active = $2)
               AND ($3::TEXT IS NULL OR u.name ILIKE $3 OR u.email ILIKE $3)
             ORDER BY u.id"
        ))
        .bind(filter.role_name())
        .bind(filter.active())
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO users (name, email, password, phone, role_id, avatar)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id",
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.phone)
        .bind(user.role_id)
        .bind(&user.avatar)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| constraint_error(e, "Email already in use", "Role not found"))?;

        self.find_by_id(id)
            .await?
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))
    }

    async fn update_user(&self, id: i64, changes: UserChanges) -> StoreResult<Option<User>> {
        let updated: Option<i64> = sqlx::query_scalar(
            "UPDATE users SET
                name = COALESCE($2, name),
                password = COALESCE($3, password),
                phone = COALESCE($4, phone),
                role_id = COALESCE($5, role_id),
                avatar = COALESCE($6, avatar),
                active = COALESCE($7, active),
                updated_at = NOW()
             WHERE id = $1
             RETURNING id",
        )
        .bind(id)
        .bind(&changes.name)
        .bind(&changes.password_hash)
        .bind(&changes.phone)
        .bind(changes.role_id)
        .bind(&changes.avatar)
        .bind(changes.active)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| constraint_error(e, "Email already in use", "Role not found"))?;

        match updated {
            Some(id) => self.find_by_id(id).await,
            None => Ok(None),
        }
    }

    async fn delete_user(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_roles(&self) -> StoreResult<Vec<Role>> {
        let roles = sqlx::query_as::<_, Role>("SELECT id, name FROM roles ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(roles)
    }

    async fn find_role(&self, id: i64) -> StoreResult<Option<Role>> {
        let role = sqlx::query_as::<_, Role>("SELECT id, name FROM roles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(role)
    }

    async fn create_role(&self, name: &str) -> StoreResult<Role> {
        sqlx::query_as::<_, Role>("INSERT INTO roles (name) VALUES ($1) RETURNING id, name")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| constraint_error(e, "Role already exists", "Role not found"))
    }

    async fn update_role(&self, id: i64, name: &str) -> StoreResult<Option<Role>> {
        sqlx::query_as::<_, Role>("UPDATE roles SET name = $2 WHERE id = $1 RETURNING id, name")
            .bind(id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| constraint_error(e, "Role already exists", "Role not found"))
    }

    async fn delete_role(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| constraint_error(e, "Role already exists", "Role is assigned to users"))?;
        Ok(result.rows_affected() > 0)
    }
}
