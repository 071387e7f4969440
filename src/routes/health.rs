use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::AppState;

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let db = state.users.ping().await;
    let kv = state.kv.ping().await;

    match (db, kv) {
        (Ok(()), Ok(())) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "db": "connected", "kv": "connected" })),
        ),
        (db, kv) => {
            tracing::warn!(db = ?db.err(), kv = ?kv.err(), "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "error" })),
            )
        }
    }
}
