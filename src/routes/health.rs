use axum::{Router, extract::State, http::StatusCode, response::Json, routing::get};
use serde_json::{Value, json};

use crate::server::AppState;

/// Liveness probe.
///
/// # Route
/// - **Method**: GET
/// - **Path**: `/ping`
///
/// ```bash
/// curl http://localhost:5000/ping
/// # Response: {"status":"pong"}
/// ```
pub async fn ping() -> Json<Value> {
    Json(json!({ "status": "pong" }))
}

/// Readiness probe. Reports `DEGRADED` with 503 when the store cannot be reached.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "OK", "message": "Cassanova API is running" })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "DEGRADED", "message": "Database unavailable" })),
            )
        }
    }
}

pub fn create_health_routes() -> Router<AppState> {
    Router::new()
        .route("/ping", get(ping))
        .route("/api/health", get(health))
}
