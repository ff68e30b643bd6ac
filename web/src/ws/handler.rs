use crate::AppState;
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::Response;
use live::Scope;
use log::*;
use serde::Deserialize;

use super::session;

#[derive(Debug, Deserialize)]
pub(crate) struct ConnectParams {
    task_id: Option<String>,
}

/// GET /ws. Keyed when `?task_id=` is present, a broadcast/echo session otherwise.
pub(crate) async fn connect(
    State(app_state): State<AppState>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(ws, Scope::from_task_id(params.task_id), app_state)
}

/// GET /ws/{task_id}. Subscribes to live updates for a single task.
pub(crate) async fn connect_task(
    State(app_state): State<AppState>,
    Path(task_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(ws, Scope::from_task_id(Some(task_id)), app_state)
}

fn upgrade(ws: WebSocketUpgrade, scope: Scope, app_state: AppState) -> Response {
    debug!("Upgrading WebSocket connection ({scope})");
    ws.on_upgrade(move |socket| session::run_session(socket, scope, app_state))
}
