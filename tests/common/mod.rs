#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use usermgmt_api::{
    config::AuthConfig,
    db::{
        memory::{MemoryKv, MemoryUserStore},
        UserStore,
    },
    models::user::{NewUser, User},
    services::{
        email::{Mailer, OutgoingEmail},
        password::hash_password,
    },
    AppState,
};

pub const ADMIN_ROLE_ID: i64 = 1;
pub const USER_ROLE_ID: i64 = 2;

/// Captures every message instead of delivering it. Flip `failing` to
/// simulate a transport outage.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<OutgoingEmail>>,
    pub failing: AtomicBool,
}

impl RecordingMailer {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutgoingEmail) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("smtp unavailable");
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

/// Signs `claims` with `secret` the way the service does, for crafting
/// tokens the public API never issues (e.g. already expired).
pub fn sign_token(secret: &str, claims: &Value) -> String {
    jsonwebtoken::encode(
        &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
        claims,
        &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

pub fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn auth_config() -> AuthConfig {
    AuthConfig {
        jwt_secret: "test-access-secret".into(),
        jwt_refresh_secret: "test-refresh-secret".into(),
        jwt_reset_secret: "test-reset-secret".into(),
        access_ttl_secs: 15 * 60,
        refresh_ttl_secs: 7 * 86_400,
        remember_refresh_ttl_secs: 30 * 86_400,
        reset_ttl_secs: 15 * 60,
        production: false,
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub users: Arc<MemoryUserStore>,
    pub kv: Arc<MemoryKv>,
    pub mailer: Arc<RecordingMailer>,
}

pub struct TestResponse {
    pub status: StatusCode,
    /// Cookie name -> full `Set-Cookie` header value.
    pub set_cookies: HashMap<String, String>,
    pub json: Value,
}

impl TestResponse {
    /// Value part of a cookie set by this response.
    pub fn cookie(&self, name: &str) -> Option<String> {
        let header = self.set_cookies.get(name)?;
        let pair = header.split(';').next()?;
        pair.split_once('=').map(|(_, v)| v.to_string())
    }

    pub fn message(&self) -> &str {
        self.json["message"].as_str().unwrap_or_default()
    }
}

impl TestApp {
    pub fn new() -> Self {
        let users = Arc::new(MemoryUserStore::new());
        let kv = Arc::new(MemoryKv::new());
        let mailer = Arc::new(RecordingMailer::default());
        let state = AppState::new(&auth_config(), users.clone(), kv.clone(), mailer.clone());
        Self {
            router: usermgmt_api::router(state.clone()),
            state,
            users,
            kv,
            mailer,
        }
    }

    pub async fn seed_user(&self, email: &str, password: &str, role_id: i64) -> User {
        self.users
            .create_user(NewUser {
                name: "Test User".into(),
                email: email.into(),
                password_hash: hash_password(password).await.unwrap(),
                phone: None,
                role_id,
                avatar: None,
            })
            .await
            .unwrap()
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        cookies: &[(&str, &str)],
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if !cookies.is_empty() {
            let cookie_header = cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; ");
            builder = builder.header(header::COOKIE, cookie_header);
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let set_cookies = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| {
                let name = v.split('=').next()?.trim().to_string();
                Some((name, v.to_string()))
            })
            .collect();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            set_cookies,
            json,
        }
    }

    pub async fn post(&self, uri: &str, cookies: &[(&str, &str)], body: Value) -> TestResponse {
        self.request(Method::POST, uri, cookies, Some(body)).await
    }

    pub async fn get(&self, uri: &str, cookies: &[(&str, &str)]) -> TestResponse {
        self.request(Method::GET, uri, cookies, None).await
    }

    /// Logs in and returns `(accessToken, refreshToken)`.
    pub async fn login(&self, email: &str, password: &str) -> (String, String) {
        let res = self
            .post(
                "/api/auth/login",
                &[],
                serde_json::json!({ "email": email, "password": password }),
            )
            .await;
        assert_eq!(res.status, StatusCode::OK, "login failed: {}", res.json);
        (
            res.cookie("accessToken").unwrap(),
            res.cookie("refreshToken").unwrap(),
        )
    }

    /// The code from the most recent OTP email sent to `email`.
    pub fn last_otp_for(&self, email: &str) -> String {
        let sent = self.mailer.sent.lock().unwrap();
        let message = sent
            .iter()
            .rev()
            .find(|m| m.to == email)
            .expect("no OTP email sent");
        message
            .text
            .split(|c: char| !c.is_ascii_digit())
            .find(|chunk| chunk.len() == 6)
            .expect("no 6-digit code in email")
            .to_string()
    }
}
