use axum::{extract::Request, middleware::Next, response::Response};

use crate::{error::AppError, models::auth::Identity};

/// Role gate layered after `authenticate`: only `admin` identities get through.
pub async fn require_admin(request: Request, next: Next) -> Result<Response, AppError> {
    let is_admin = request
        .extensions()
        .get::<Identity>()
        .is_some_and(Identity::is_admin);

    if !is_admin {
        return Err(AppError::forbidden("Admin Access Required"));
    }

    Ok(next.run(request).await)
}
