pub mod admin;
pub mod auth;
pub mod health;

use axum::extract::FromRequest;

use crate::error::AppError;

/// `Json` body extractor whose rejections render as `{ "message": ... }` 400s.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);
