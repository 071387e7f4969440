use axum::{extract::State, Json};
use axum_extra::extract::cookie::CookieJar;
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    models::{
        auth::Identity,
        user::{ForgotPasswordRequest, LoginRequest, ResetPasswordRequest, UserProfile, VerifyOtpRequest},
    },
    routes::ApiJson,
    services::cookies::{ACCESS_COOKIE, REFRESH_COOKIE, RESET_COOKIE},
    AppState,
};

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(body): ApiJson<LoginRequest>,
) -> AppResult<(CookieJar, Json<Value>)> {
    let outcome = state
        .auth
        .login(&body.email, &body.password, body.remember_me)
        .await?;

    let jar = jar
        .add(state.cookies.build(
            ACCESS_COOKIE,
            outcome.access_token,
            state.tokens.access_ttl(),
        ))
        .add(state.cookies.build(
            REFRESH_COOKIE,
            outcome.refresh_token,
            state.tokens.refresh_ttl(outcome.remember),
        ));

    Ok((
        jar,
        Json(json!({
            "message": "Login successful",
            "user": UserProfile::from(outcome.user),
        })),
    ))
}

/// Clears the session cookies. Tokens already issued stay valid until they expire.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Json<Value>) {
    let jar = jar
        .add(state.cookies.clear(ACCESS_COOKIE))
        .add(state.cookies.clear(REFRESH_COOKIE));
    (jar, Json(json!({ "message": "Logged out successfully" })))
}

pub async fn refresh_token(
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<Value>)> {
    let access_token = state
        .auth
        .refresh(jar.get(REFRESH_COOKIE).map(|c| c.value()))?;

    let jar = jar.add(state.cookies.build(
        ACCESS_COOKIE,
        access_token,
        state.tokens.access_ttl(),
    ));
    Ok((jar, Json(json!({ "message": "Token refreshed successfully" }))))
}

pub async fn me(State(state): State<AppState>, identity: Identity) -> AppResult<Json<Value>> {
    let user = state.auth.current_user(&identity).await?;
    Ok(Json(json!({ "user": UserProfile::from(user) })))
}

pub async fn forgot_password(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ForgotPasswordRequest>,
) -> AppResult<Json<Value>> {
    state.auth.forgot_password(&body.email).await?;
    Ok(Json(json!({ "message": "OTP sent to your email" })))
}

pub async fn verify_otp(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(body): ApiJson<VerifyOtpRequest>,
) -> AppResult<(CookieJar, Json<Value>)> {
    let reset_token = state.auth.verify_otp(&body.email, &body.otp).await?;
    let jar = jar.add(state.cookies.build(
        RESET_COOKIE,
        reset_token,
        state.tokens.reset_ttl(),
    ));
    Ok((jar, Json(json!({ "message": "OTP verified successfully" }))))
}

/// The reset cookie is checked before the body, so a missing or bad token
/// wins over a malformed payload.
pub async fn reset_password(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Result<ApiJson<ResetPasswordRequest>, AppError>,
) -> AppResult<(CookieJar, Json<Value>)> {
    let email = state
        .auth
        .reset_email(jar.get(RESET_COOKIE).map(|c| c.value()))?;
    let ApiJson(body) = body?;

    state
        .auth
        .reset_password(
            &email,
            body.password.as_deref(),
            body.confirm_password.as_deref(),
        )
        .await?;

    let jar = jar.add(state.cookies.clear(RESET_COOKIE));
    Ok((jar, Json(json!({ "message": "Password reset successfully" }))))
}
