//! End-to-end auth flows against the full router with in-memory stores.

mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::{auth_config, now_secs, sign_token, TestApp, USER_ROLE_ID};
use usermgmt_api::{db::KeyValueStore, db::UserStore};

// ─── Login / logout ──────────────────────────────────────────────────────────

#[tokio::test]
async fn login_sets_both_cookies_and_returns_profile_without_password() {
    let app = TestApp::new();
    let user = app.seed_user("a@x.com", "Secret123", USER_ROLE_ID).await;

    let res = app
        .post("/api/auth/login", &[], json!({ "email": "a@x.com", "password": "Secret123" }))
        .await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json["user"]["id"], user.id);
    assert_eq!(res.json["user"]["email"], "a@x.com");
    assert_eq!(res.json["user"]["role"]["name"], "user");
    assert!(res.json["user"].get("password").is_none());
    assert!(res.json["user"].get("passwordHash").is_none());

    let access = &res.set_cookies["accessToken"];
    assert!(access.contains("HttpOnly"));
    assert!(access.contains("Max-Age=900"));
    assert!(res.set_cookies["refreshToken"].contains("Max-Age=604800"));
}

#[tokio::test]
async fn remember_me_extends_refresh_cookie_to_thirty_days() {
    let app = TestApp::new();
    app.seed_user("a@x.com", "Secret123", USER_ROLE_ID).await;

    let res = app
        .post(
            "/api/auth/login",
            &[],
            json!({ "email": "a@x.com", "password": "Secret123", "rememberMe": true }),
        )
        .await;

    assert_eq!(res.status, StatusCode::OK);
    assert!(res.set_cookies["refreshToken"].contains("Max-Age=2592000"));
}

#[tokio::test]
async fn wrong_password_and_unknown_email_are_indistinguishable() {
    let app = TestApp::new();
    app.seed_user("a@x.com", "Secret123", USER_ROLE_ID).await;

    let wrong_password = app
        .post("/api/auth/login", &[], json!({ "email": "a@x.com", "password": "nope" }))
        .await;
    let unknown_email = app
        .post("/api/auth/login", &[], json!({ "email": "ghost@x.com", "password": "Secret123" }))
        .await;

    assert_eq!(wrong_password.status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_email.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password.json, unknown_email.json);
    assert_eq!(wrong_password.message(), "Invalid email or password");
    assert!(wrong_password.set_cookies.is_empty());
}

#[tokio::test]
async fn deactivated_account_is_rejected_only_with_correct_password() {
    let app = TestApp::new();
    let user = app.seed_user("a@x.com", "Secret123", USER_ROLE_ID).await;
    app.users
        .update_user(
            user.id,
            usermgmt_api::models::user::UserChanges { active: Some(false), ..Default::default() },
        )
        .await
        .unwrap();

    let wrong = app
        .post("/api/auth/login", &[], json!({ "email": "a@x.com", "password": "nope" }))
        .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);

    let right = app
        .post("/api/auth/login", &[], json!({ "email": "a@x.com", "password": "Secret123" }))
        .await;
    assert_eq!(right.status, StatusCode::FORBIDDEN);
    assert!(right.set_cookies.is_empty());
}

#[tokio::test]
async fn malformed_login_body_is_a_validation_error() {
    let app = TestApp::new();
    let res = app
        .request(Method::POST, "/api/auth/login", &[], None)
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert!(!res.message().is_empty());
}

#[tokio::test]
async fn logout_clears_both_cookies_without_a_session() {
    let app = TestApp::new();
    let res = app.request(Method::POST, "/api/auth/logout", &[], None).await;

    assert_eq!(res.status, StatusCode::OK);
    assert!(res.set_cookies["accessToken"].contains("Max-Age=0"));
    assert!(res.set_cookies["refreshToken"].contains("Max-Age=0"));
}

#[tokio::test]
async fn logout_does_not_revoke_issued_tokens() {
    let app = TestApp::new();
    app.seed_user("a@x.com", "Secret123", USER_ROLE_ID).await;
    let (access, _) = app.login("a@x.com", "Secret123").await;

    app.request(Method::POST, "/api/auth/logout", &[("accessToken", &access)], None)
        .await;

    let me = app.get("/api/auth/me", &[("accessToken", &access)]).await;
    assert_eq!(me.status, StatusCode::OK);
}

// ─── Session middleware ──────────────────────────────────────────────────────

#[tokio::test]
async fn me_without_cookies_is_unauthorized() {
    let app = TestApp::new();
    let res = app.get("/api/auth/me", &[]).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.message(), "No token provided");
}

#[tokio::test]
async fn me_with_access_cookie_returns_profile() {
    let app = TestApp::new();
    let user = app.seed_user("a@x.com", "Secret123", USER_ROLE_ID).await;
    let (access, _) = app.login("a@x.com", "Secret123").await;

    let res = app.get("/api/auth/me", &[("accessToken", &access)]).await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json["user"]["id"], user.id);
    assert!(res.json["user"].get("password").is_none());
    assert!(res.set_cookies.get("accessToken").is_none());
}

#[tokio::test]
async fn me_with_only_refresh_cookie_refreshes_silently() {
    let app = TestApp::new();
    let user = app.seed_user("a@x.com", "Secret123", USER_ROLE_ID).await;
    let (_, refresh) = app.login("a@x.com", "Secret123").await;

    let res = app.get("/api/auth/me", &[("refreshToken", &refresh)]).await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json["user"]["id"], user.id);
    let fresh = res.cookie("accessToken").expect("fresh accessToken cookie");
    assert_eq!(app.state.tokens.verify_access(&fresh).unwrap().id, user.id);
    // The refresh token is reused, not rotated.
    assert!(res.set_cookies.get("refreshToken").is_none());
}

#[tokio::test]
async fn invalid_access_cookie_falls_back_to_refresh_cookie() {
    let app = TestApp::new();
    app.seed_user("a@x.com", "Secret123", USER_ROLE_ID).await;
    let (_, refresh) = app.login("a@x.com", "Secret123").await;

    let res = app
        .get("/api/auth/me", &[("accessToken", "expired.or.bogus"), ("refreshToken", &refresh)])
        .await;

    assert_eq!(res.status, StatusCode::OK);
    assert!(res.cookie("accessToken").is_some());
}

#[tokio::test]
async fn invalid_refresh_cookie_is_forbidden() {
    let app = TestApp::new();
    let res = app.get("/api/auth/me", &[("refreshToken", "bogus")]).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(res.message(), "Invalid token");
}

#[tokio::test]
async fn expired_refresh_cookie_is_forbidden() {
    let app = TestApp::new();
    let user = app.seed_user("a@x.com", "Secret123", USER_ROLE_ID).await;
    let now = now_secs();
    let stale = sign_token(
        &auth_config().jwt_refresh_secret,
        &json!({ "id": user.id, "role": "user", "aud": "refresh", "iat": now - 604_801, "exp": now - 1 }),
    );

    let res = app.get("/api/auth/me", &[("refreshToken", &stale)]).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(res.message(), "Invalid token");
    assert!(res.cookie("accessToken").is_none());
}

#[tokio::test]
async fn me_for_deleted_user_is_not_found() {
    let app = TestApp::new();
    let user = app.seed_user("a@x.com", "Secret123", USER_ROLE_ID).await;
    let (access, _) = app.login("a@x.com", "Secret123").await;
    app.users.delete_user(user.id).await.unwrap();

    let res = app.get("/api/auth/me", &[("accessToken", &access)]).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.message(), "User not found");
}

// ─── Explicit refresh endpoint ───────────────────────────────────────────────

#[tokio::test]
async fn refresh_endpoint_status_contract() {
    let app = TestApp::new();
    app.seed_user("a@x.com", "Secret123", USER_ROLE_ID).await;
    let (access, refresh) = app.login("a@x.com", "Secret123").await;

    let missing = app.request(Method::POST, "/api/auth/refresh-token", &[], None).await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);

    let invalid = app
        .request(Method::POST, "/api/auth/refresh-token", &[("refreshToken", &access)], None)
        .await;
    assert_eq!(invalid.status, StatusCode::FORBIDDEN);

    let ok = app
        .request(Method::POST, "/api/auth/refresh-token", &[("refreshToken", &refresh)], None)
        .await;
    assert_eq!(ok.status, StatusCode::OK);
    assert!(ok.cookie("accessToken").is_some());
}

// ─── Forgot / verify / reset ─────────────────────────────────────────────────

#[tokio::test]
async fn forgot_password_for_unknown_email_is_not_found() {
    let app = TestApp::new();
    let res = app
        .post("/api/auth/forgot-password", &[], json!({ "email": "ghost@x.com" }))
        .await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert!(app.mailer.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn second_forgot_password_while_otp_outstanding_is_rejected() {
    let app = TestApp::new();
    app.seed_user("a@x.com", "Secret123", USER_ROLE_ID).await;

    let first = app
        .post("/api/auth/forgot-password", &[], json!({ "email": "a@x.com" }))
        .await;
    assert_eq!(first.status, StatusCode::OK);
    let code = app.last_otp_for("a@x.com");

    let second = app
        .post("/api/auth/forgot-password", &[], json!({ "email": "a@x.com" }))
        .await;
    assert_eq!(second.status, StatusCode::TOO_MANY_REQUESTS);

    // The original code is still the live one.
    assert_eq!(app.kv.get("otp:a@x.com").await.unwrap(), Some(code));
    assert_eq!(app.mailer.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn failed_otp_delivery_does_not_block_a_retry() {
    let app = TestApp::new();
    app.seed_user("a@x.com", "Secret123", USER_ROLE_ID).await;

    app.mailer.set_failing(true);
    let failed = app
        .post("/api/auth/forgot-password", &[], json!({ "email": "a@x.com" }))
        .await;
    assert_eq!(failed.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(failed.message(), "Internal server error");
    assert_eq!(app.kv.get("otp:a@x.com").await.unwrap(), None);

    app.mailer.set_failing(false);
    let retry = app
        .post("/api/auth/forgot-password", &[], json!({ "email": "a@x.com" }))
        .await;
    assert_eq!(retry.status, StatusCode::OK);
    let code = app.last_otp_for("a@x.com");
    assert_eq!(app.kv.get("otp:a@x.com").await.unwrap(), Some(code));
}

#[tokio::test]
async fn verify_otp_rejects_wrong_code_and_is_single_use() {
    let app = TestApp::new();
    app.seed_user("a@x.com", "Secret123", USER_ROLE_ID).await;
    app.post("/api/auth/forgot-password", &[], json!({ "email": "a@x.com" }))
        .await;
    let code = app.last_otp_for("a@x.com");
    let wrong = if code == "123456" { "654321" } else { "123456" };

    let res = app
        .post("/api/auth/verify-otp", &[], json!({ "email": "a@x.com", "otp": wrong }))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.message(), "Invalid OTP");
    assert!(res.cookie("resetToken").is_none());

    let res = app
        .post("/api/auth/verify-otp", &[], json!({ "email": "a@x.com", "otp": code }))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.cookie("resetToken").is_some());
    assert_eq!(app.kv.get("otp:a@x.com").await.unwrap(), None);

    let replay = app
        .post("/api/auth/verify-otp", &[], json!({ "email": "a@x.com", "otp": code }))
        .await;
    assert_eq!(replay.status, StatusCode::BAD_REQUEST);
    assert_eq!(replay.message(), "OTP expired or not found");
}

/// Runs forgot-password and verify-otp, returning the reset token.
async fn reset_token_for(app: &TestApp, email: &str) -> String {
    let res = app
        .post("/api/auth/forgot-password", &[], json!({ "email": email }))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    let code = app.last_otp_for(email);
    let res = app
        .post("/api/auth/verify-otp", &[], json!({ "email": email, "otp": code }))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    res.cookie("resetToken").unwrap()
}

#[tokio::test]
async fn reset_password_token_checks() {
    let app = TestApp::new();
    let body = json!({ "password": "NewPass1", "confirmPassword": "NewPass1" });

    let missing = app.post("/api/auth/reset-password", &[], body.clone()).await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);

    let invalid = app
        .post("/api/auth/reset-password", &[("resetToken", "bogus")], body.clone())
        .await;
    assert_eq!(invalid.status, StatusCode::FORBIDDEN);
    assert!(invalid.message().contains("restart"));

    // An access token is not a reset token.
    app.seed_user("a@x.com", "Secret123", USER_ROLE_ID).await;
    let (access, _) = app.login("a@x.com", "Secret123").await;
    let wrong_class = app
        .post("/api/auth/reset-password", &[("resetToken", &access)], body)
        .await;
    assert_eq!(wrong_class.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn reset_token_is_checked_before_the_body() {
    let app = TestApp::new();

    let no_cookie_no_body = app
        .request(Method::POST, "/api/auth/reset-password", &[], None)
        .await;
    assert_eq!(no_cookie_no_body.status, StatusCode::UNAUTHORIZED);
    assert_eq!(no_cookie_no_body.message(), "Reset token required");

    let no_cookie_bad_body = app
        .post("/api/auth/reset-password", &[], json!({ "password": 1 }))
        .await;
    assert_eq!(no_cookie_bad_body.status, StatusCode::UNAUTHORIZED);

    let bad_cookie_no_body = app
        .request(Method::POST, "/api/auth/reset-password", &[("resetToken", "bogus")], None)
        .await;
    assert_eq!(bad_cookie_no_body.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn malformed_body_with_valid_reset_token_is_a_validation_error() {
    let app = TestApp::new();
    app.seed_user("a@x.com", "Secret123", USER_ROLE_ID).await;
    let token = reset_token_for(&app, "a@x.com").await;

    let res = app
        .post("/api/auth/reset-password", &[("resetToken", &token)], json!({ "password": 1 }))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn expired_reset_token_asks_to_restart() {
    let app = TestApp::new();
    app.seed_user("a@x.com", "Secret123", USER_ROLE_ID).await;
    let now = now_secs();
    let stale = sign_token(
        &auth_config().jwt_reset_secret,
        &json!({ "email": "a@x.com", "aud": "reset", "iat": now - 901, "exp": now - 1 }),
    );

    let res = app
        .post(
            "/api/auth/reset-password",
            &[("resetToken", &stale)],
            json!({ "password": "NewPass1", "confirmPassword": "NewPass1" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert!(res.message().contains("restart the password reset process"));
}

#[tokio::test]
async fn reset_password_validates_fields() {
    let app = TestApp::new();
    app.seed_user("a@x.com", "Secret123", USER_ROLE_ID).await;
    let token = reset_token_for(&app, "a@x.com").await;
    let cookies = [("resetToken", token.as_str())];

    let missing = app
        .post("/api/auth/reset-password", &cookies, json!({ "password": "NewPass1" }))
        .await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);

    let mismatch = app
        .post(
            "/api/auth/reset-password",
            &cookies,
            json!({ "password": "NewPass1", "confirmPassword": "NewPass2" }),
        )
        .await;
    assert_eq!(mismatch.status, StatusCode::BAD_REQUEST);
    assert_eq!(mismatch.message(), "Passwords do not match");
}

#[tokio::test]
async fn reset_password_rejects_current_password() {
    let app = TestApp::new();
    app.seed_user("a@x.com", "P1secret", USER_ROLE_ID).await;
    let token = reset_token_for(&app, "a@x.com").await;

    let res = app
        .post(
            "/api/auth/reset-password",
            &[("resetToken", &token)],
            json!({ "password": "P1secret", "confirmPassword": "P1secret" }),
        )
        .await;

    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert!(res.message().contains("must be different"));
}

#[tokio::test]
async fn reset_password_for_deleted_user_is_not_found() {
    let app = TestApp::new();
    let user = app.seed_user("a@x.com", "Secret123", USER_ROLE_ID).await;
    let token = reset_token_for(&app, "a@x.com").await;
    app.users.delete_user(user.id).await.unwrap();

    let res = app
        .post(
            "/api/auth/reset-password",
            &[("resetToken", &token)],
            json!({ "password": "NewPass1", "confirmPassword": "NewPass1" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn full_password_reset_flow() {
    let app = TestApp::new();
    app.seed_user("a@x.com", "OldPass1", USER_ROLE_ID).await;

    let res = app
        .post("/api/auth/forgot-password", &[], json!({ "email": "a@x.com" }))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    let code = app.last_otp_for("a@x.com");
    assert_eq!(app.kv.get("otp:a@x.com").await.unwrap().as_deref(), Some(code.as_str()));

    let res = app
        .post("/api/auth/verify-otp", &[], json!({ "email": "a@x.com", "otp": code }))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    let reset = res.cookie("resetToken").unwrap();
    assert!(res.set_cookies["resetToken"].contains("Max-Age=900"));
    assert_eq!(app.kv.get("otp:a@x.com").await.unwrap(), None);

    let res = app
        .post(
            "/api/auth/reset-password",
            &[("resetToken", &reset)],
            json!({ "password": "NewPass1", "confirmPassword": "NewPass1" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.set_cookies["resetToken"].contains("Max-Age=0"));

    let old = app
        .post("/api/auth/login", &[], json!({ "email": "a@x.com", "password": "OldPass1" }))
        .await;
    assert_eq!(old.status, StatusCode::UNAUTHORIZED);

    let new = app
        .post(
            "/api/auth/login",
            &[],
            json!({ "email": "a@x.com", "password": "NewPass1", "rememberMe": false }),
        )
        .await;
    assert_eq!(new.status, StatusCode::OK);
}
