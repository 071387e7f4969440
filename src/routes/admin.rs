use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    models::user::{
        CreateUserRequest, NewUser, RoleRequest, UpdateUserRequest, UserChanges, UserFilter,
        UserProfile,
    },
    routes::ApiJson,
    services::password::hash_password,
    AppState,
};

fn required<'a>(value: &'a str, field: &str) -> AppResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::validation(format!("{field} is required")));
    }
    Ok(value)
}

async fn ensure_role_exists(state: &AppState, role_id: i64) -> AppResult<()> {
    match state.users.find_role(role_id).await? {
        Some(_) => Ok(()),
        None => Err(AppError::validation("Role not found")),
    }
}

// ─── Roles ───────────────────────────────────────────────────────────────────

pub async fn list_roles(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let roles = state.users.list_roles().await?;
    Ok(Json(json!(roles)))
}

pub async fn create_role(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RoleRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let name = required(&body.name, "Role name")?;
    let role = state.users.create_role(name).await?;
    tracing::info!(role_id = role.id, "role created");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Role created successfully", "role": role })),
    ))
}

pub async fn update_role(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<RoleRequest>,
) -> AppResult<Json<Value>> {
    let name = required(&body.name, "Role name")?;
    let role = state
        .users
        .update_role(id, name)
        .await?
        .ok_or_else(|| AppError::not_found("Role not found"))?;
    Ok(Json(json!({ "message": "Role updated successfully", "role": role })))
}

pub async fn delete_role(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    if !state.users.delete_role(id).await? {
        return Err(AppError::not_found("Role not found"));
    }
    tracing::info!(role_id = id, "role deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ─── Users ───────────────────────────────────────────────────────────────────

/// `?role=<name>&status=active|inactive&search=<name or email fragment>`
pub async fn list_users(
    State(state): State<AppState>,
    Query(filter): Query<UserFilter>,
) -> AppResult<Json<Value>> {
    let users: Vec<UserProfile> = state
        .users
        .list_users(&filter)
        .await?
        .into_iter()
        .map(UserProfile::from)
        .collect();
    Ok(Json(json!(users)))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Value>> {
    let user = state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(Json(json!(UserProfile::from(user))))
}

pub async fn create_user(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let name = required(&body.name, "Name")?;
    let email = required(&body.email, "Email")?;
    let password = required(&body.password, "Password")?;
    ensure_role_exists(&state, body.role_id).await?;

    let user = state
        .users
        .create_user(NewUser {
            name: name.to_string(),
            email: email.to_string(),
            password_hash: hash_password(password).await?,
            phone: body.phone,
            role_id: body.role_id,
            avatar: body.avatar,
        })
        .await?;
    tracing::info!(user_id = user.id, "user created");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User created successfully",
            "user": UserProfile::from(user),
        })),
    ))
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<UpdateUserRequest>,
) -> AppResult<Json<Value>> {
    if let Some(role_id) = body.role_id {
        ensure_role_exists(&state, role_id).await?;
    }

    let password_hash = match body.password.as_deref().filter(|p| !p.is_empty()) {
        Some(password) => Some(hash_password(password).await?),
        None => None,
    };

    let changes = UserChanges {
        name: body.name.filter(|n| !n.trim().is_empty()),
        password_hash,
        phone: body.phone,
        role_id: body.role_id,
        avatar: body.avatar,
        active: body.active,
    };

    let user = state
        .users
        .update_user(id, changes)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    Ok(Json(json!({
        "message": "User updated successfully",
        "user": UserProfile::from(user),
    })))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    if !state.users.delete_user(id).await? {
        return Err(AppError::not_found("User not found"));
    }
    tracing::info!(user_id = id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}
