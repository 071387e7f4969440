use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;

use crate::{
    error::AppError,
    models::auth::Identity,
    services::{
        cookies::{ACCESS_COOKIE, REFRESH_COOKIE},
        token::TokenService,
    },
    AppState,
};

/// How the caller's identity was established for this request.
#[derive(Debug, PartialEq, Eq)]
pub enum Session {
    /// The access token was valid.
    Established(Identity),
    /// The access token was missing or invalid; a new one was minted from the refresh token.
    Refreshed { identity: Identity, access_token: String },
}

impl Session {
    pub fn identity(&self) -> &Identity {
        match self {
            Session::Established(identity) | Session::Refreshed { identity, .. } => identity,
        }
    }
}

/// Decide the session from the two cookie values.
pub fn resolve_session(
    tokens: &TokenService,
    access: Option<&str>,
    refresh: Option<&str>,
) -> Result<Session, AppError> {
    if access.is_none() && refresh.is_none() {
        return Err(AppError::unauthorized("No token provided"));
    }

    if let Some(identity) = access.and_then(|t| tokens.verify_access(t).ok()) {
        return Ok(Session::Established(identity));
    }

    let refresh = refresh.ok_or_else(|| AppError::unauthorized("Refresh token required"))?;
    let identity = tokens
        .verify_refresh(refresh)
        .map_err(|_| AppError::forbidden("Invalid token"))?;
    let access_token = tokens.issue_access_token(&identity)?;
    Ok(Session::Refreshed { identity, access_token })
}

/// Establishes the caller's identity from session cookies, refreshing the
/// access token silently when only the refresh token is still valid.
pub async fn authenticate(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let session = resolve_session(
        &state.tokens,
        jar.get(ACCESS_COOKIE).map(|c| c.value()),
        jar.get(REFRESH_COOKIE).map(|c| c.value()),
    )?;

    request.extensions_mut().insert(session.identity().clone());

    match session {
        Session::Established(_) => Ok(next.run(request).await),
        Session::Refreshed { identity, access_token } => {
            tracing::info!(user_id = identity.id, "access token silently refreshed");
            let cookie = state
                .cookies
                .build(ACCESS_COOKIE, access_token, state.tokens.access_ttl());
            let response = next.run(request).await;
            Ok((CookieJar::new().add(cookie), response).into_response())
        }
    }
}

/// Handlers behind `authenticate` take the caller's identity as an argument.
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or_else(|| AppError::unauthorized("No token provided"))
    }
}
