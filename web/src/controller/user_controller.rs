use crate::controller::ApiResponse;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

/// GET the current user. There is no authentication yet, so this is a fixed record.
#[utoipa::path(
    get,
    path = "/api/users/me",
    responses(
        (status = 200, description = "The current user")
    ),
    tag = "forex_companion"
)]
pub async fn me() -> impl IntoResponse {
    Json(ApiResponse::new(
        StatusCode::OK.into(),
        json!({
            "id": "user_1",
            "email": "user@example.com",
            "name": "Test User"
        }),
    ))
}
