pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::any::Any;
use std::sync::Arc;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Router,
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use config::AuthConfig;
use db::{KeyValueStore, UserStore};
use error::AppError;
use services::{
    auth::AuthService, cookies::CookiePolicy, email::Mailer, otp::OtpService,
    token::TokenService,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub kv: Arc<dyn KeyValueStore>,
    pub tokens: Arc<TokenService>,
    pub cookies: CookiePolicy,
    pub auth: Arc<AuthService>,
}

impl AppState {
    pub fn new(
        auth_config: &AuthConfig,
        users: Arc<dyn UserStore>,
        kv: Arc<dyn KeyValueStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let tokens = Arc::new(TokenService::new(auth_config));
        let auth = AuthService::new(
            users.clone(),
            tokens.clone(),
            OtpService::new(kv.clone()),
            mailer,
        );
        Self {
            users,
            kv,
            tokens,
            cookies: CookiePolicy::from_config(auth_config),
            auth: Arc::new(auth),
        }
    }
}

fn panic_response(_panic: Box<dyn Any + Send + 'static>) -> Response {
    AppError::Internal("handler panicked".into()).into_response()
}

/// Full API under `/api`. Admin routes authenticate first, then check the role.
pub fn router(state: AppState) -> Router {
    let auth = Router::new()
        .route("/login", post(routes::auth::login))
        .route("/logout", post(routes::auth::logout))
        .route("/refresh-token", post(routes::auth::refresh_token))
        .route("/forgot-password", post(routes::auth::forgot_password))
        .route("/verify-otp", post(routes::auth::verify_otp))
        .route("/reset-password", post(routes::auth::reset_password))
        .merge(
            Router::new()
                .route("/me", get(routes::auth::me))
                .route_layer(from_fn_with_state(state.clone(), middleware::auth::authenticate)),
        );

    let admin = Router::new()
        .route("/roles", get(routes::admin::list_roles).post(routes::admin::create_role))
        .route("/roles/{id}", patch(routes::admin::update_role).delete(routes::admin::delete_role))
        .route("/users", get(routes::admin::list_users).post(routes::admin::create_user))
        .route(
            "/users/{id}",
            get(routes::admin::get_user)
                .patch(routes::admin::update_user)
                .delete(routes::admin::delete_user),
        )
        .route_layer(from_fn(middleware::admin::require_admin))
        .route_layer(from_fn_with_state(state.clone(), middleware::auth::authenticate));

    let api = Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/auth", auth)
        .nest("/admin", admin);

    Router::new()
        .nest("/api", api)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
