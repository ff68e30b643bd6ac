use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

/// GET a short description of the API and where its docs live
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service name, version and docs location")
    ),
    tag = "forex_companion"
)]
pub async fn index() -> impl IntoResponse {
    Json(json!({
        "message": "Welcome to the Forex Companion API!",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "This API provides services for user management, task processing, and live updates.",
        "docs": "/docs"
    }))
}
