use crate::controller::ApiResponse;
use crate::{AppState, Error};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use events::{DomainEvent, TaskStatus};
use log::*;
use serde_json::{json, Value};

// Tasks are not stored. These routes acknowledge the request and publish the
// matching domain event so a client watching the task sees the change live.

/// GET all Tasks
#[utoipa::path(
    get,
    path = "/api/tasks",
    responses(
        (status = 200, description = "All known Tasks")
    ),
    tag = "forex_companion"
)]
pub async fn index() -> impl IntoResponse {
    Json(ApiResponse::new(
        StatusCode::OK.into(),
        json!({ "tasks": [], "total": 0 }),
    ))
}

/// POST create a new Task. The body must be a JSON object; its `id` is used
/// as the task id when present.
#[utoipa::path(
    post,
    path = "/api/tasks",
    responses(
        (status = 200, description = "Task accepted; the envelope carries status_code 201"),
        (status = 422, description = "Body is not a JSON object")
    ),
    tag = "forex_companion"
)]
pub async fn create(
    State(app_state): State<AppState>,
    Json(task): Json<Value>,
) -> Result<impl IntoResponse, Error> {
    if !task.is_object() {
        return Err(Error::InvalidPayload(
            "task must be a JSON object".to_string(),
        ));
    }

    let task_id = task
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.trim().is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    debug!("POST Create a new Task {task_id}");

    app_state
        .event_publisher
        .publish(DomainEvent::TaskCreated {
            task_id: task_id.clone(),
            task: task.clone(),
        })
        .await;

    Ok(Json(ApiResponse::new(
        StatusCode::CREATED.into(),
        json!({ "message": "Task created", "id": task_id, "task": task }),
    )))
}

/// GET a Task by id
#[utoipa::path(
    get,
    path = "/api/tasks/{id}",
    params(
        ("id" = String, Path, description = "Task id"),
    ),
    responses(
        (status = 200, description = "Task details and whether a client is watching it")
    ),
    tag = "forex_companion"
)]
pub async fn read(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    debug!("GET Task by id: {id}");

    let subscribed = app_state.live_manager.is_registered(&id);
    Json(ApiResponse::new(
        StatusCode::OK.into(),
        json!({ "id": id, "message": "Task details", "subscribed": subscribed }),
    ))
}

/// GET whether a client is currently watching a Task
#[utoipa::path(
    get,
    path = "/api/tasks/{id}/subscription",
    params(
        ("id" = String, Path, description = "Task id"),
    ),
    responses(
        (status = 200, description = "Whether a live subscriber is registered for the Task")
    ),
    tag = "forex_companion"
)]
pub async fn subscription(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let subscribed = app_state.live_manager.is_registered(&id);
    Json(ApiResponse::new(
        StatusCode::OK.into(),
        json!({ "id": id, "subscribed": subscribed }),
    ))
}

/// PUT stop a running Task
#[utoipa::path(
    put,
    path = "/api/tasks/{id}/stop",
    params(
        ("id" = String, Path, description = "Task id"),
    ),
    responses(
        (status = 200, description = "Task stopped and subscriber notified")
    ),
    tag = "forex_companion"
)]
pub async fn stop(State(app_state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    change_status(&app_state, id, TaskStatus::Stopped).await
}

/// PUT pause a running Task
#[utoipa::path(
    put,
    path = "/api/tasks/{id}/pause",
    params(
        ("id" = String, Path, description = "Task id"),
    ),
    responses(
        (status = 200, description = "Task paused and subscriber notified")
    ),
    tag = "forex_companion"
)]
pub async fn pause(State(app_state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    change_status(&app_state, id, TaskStatus::Paused).await
}

/// PUT resume a paused Task
#[utoipa::path(
    put,
    path = "/api/tasks/{id}/resume",
    params(
        ("id" = String, Path, description = "Task id"),
    ),
    responses(
        (status = 200, description = "Task resumed and subscriber notified")
    ),
    tag = "forex_companion"
)]
pub async fn resume(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    change_status(&app_state, id, TaskStatus::Running).await
}

/// DELETE a Task
#[utoipa::path(
    delete,
    path = "/api/tasks/{id}",
    params(
        ("id" = String, Path, description = "Task id"),
    ),
    responses(
        (status = 200, description = "Task deleted and subscriber notified")
    ),
    tag = "forex_companion"
)]
pub async fn delete(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    debug!("DELETE Task by id: {id}");

    app_state
        .event_publisher
        .publish(DomainEvent::TaskDeleted {
            task_id: id.clone(),
        })
        .await;

    Json(ApiResponse::new(
        StatusCode::OK.into(),
        json!({ "message": "Task deleted", "id": id }),
    ))
}

async fn change_status(app_state: &AppState, id: String, status: TaskStatus) -> impl IntoResponse {
    debug!("PUT Task {id} status -> {status}");

    app_state
        .event_publisher
        .publish(DomainEvent::TaskStatusChanged {
            task_id: id.clone(),
            status,
        })
        .await;

    Json(ApiResponse::new(
        StatusCode::OK.into(),
        json!({ "id": id, "status": status }),
    ))
}
