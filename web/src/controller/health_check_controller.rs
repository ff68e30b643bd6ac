use crate::AppState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde_json::json;

/// GET liveness of the API router along with the number of open WebSocket connections
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "API router is up, with live connection and subscribed task counts")
    ),
    tag = "forex_companion"
)]
pub async fn health_check(State(app_state): State<AppState>) -> impl IntoResponse {
    let registry = app_state.live_manager.registry();
    Json(json!({
        "status": "healthy",
        "connections": registry.len(),
        "subscribed_tasks": registry.task_count(),
        "timestamp": Utc::now(),
    }))
}
