use crate::{
    controller::{
        health_check_controller, root_controller, task_controller, user_controller,
    },
    ws, AppState,
};
use axum::{
    routing::{get, put},
    Router,
};
use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

/// Where the rendered OpenAPI document is served.
pub const OPENAPI_JSON_PATH: &str = "/api-docs/openapi.json";

// Every HTTP route is listed here so it shows up in the docs. The WebSocket
// upgrade routes have no OpenAPI representation.
#[derive(OpenApi)]
#[openapi(
        info(
            title = "Forex Companion API",
            description = "Task control endpoints and live task updates over WebSockets"
        ),
        paths(
            root_controller::index,
            health_check_controller::health_check,
            task_controller::index,
            task_controller::create,
            task_controller::read,
            task_controller::subscription,
            task_controller::stop,
            task_controller::pause,
            task_controller::resume,
            task_controller::delete,
            user_controller::me,
        ),
        tags(
            (name = "forex_companion", description = "Forex Companion backend API")
        )
    )]
struct ApiDoc;

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(root_routes())
        .merge(health_routes(app_state.clone()))
        .merge(live_update_routes(app_state.clone()))
        .merge(task_routes(app_state))
        .merge(user_routes())
        .merge(RapiDoc::with_openapi(OPENAPI_JSON_PATH, ApiDoc::openapi()).path("/docs"))
}

fn root_routes() -> Router {
    Router::new().route("/", get(root_controller::index))
}

fn health_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check_controller::health_check))
        .with_state(app_state)
}

fn live_update_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::handler::connect))
        .route("/ws/{task_id}", get(ws::handler::connect_task))
        .with_state(app_state)
}

fn task_routes(app_state: AppState) -> Router {
    Router::new()
        .route(
            "/api/tasks",
            get(task_controller::index).post(task_controller::create),
        )
        .route(
            "/api/tasks/{id}",
            get(task_controller::read).delete(task_controller::delete),
        )
        .route("/api/tasks/{id}/stop", put(task_controller::stop))
        .route("/api/tasks/{id}/pause", put(task_controller::pause))
        .route("/api/tasks/{id}/resume", put(task_controller::resume))
        .route(
            "/api/tasks/{id}/subscription",
            get(task_controller::subscription),
        )
        .with_state(app_state)
}

fn user_routes() -> Router {
    Router::new().route("/api/users/me", get(user_controller::me))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use clap::Parser;
    use live::Scope;
    use serde_json::{json, Value};
    use service::config::Config;
    use tower::ServiceExt;

    fn app_state() -> AppState {
        AppState::from_config(Config::parse_from(["forex_companion"]))
    }

    async fn call(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = app.oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn health_reports_open_connections() {
        let state = app_state();
        let (session, _outbox) = state.live_manager.open_session();
        state
            .live_manager
            .register_connection(Scope::Unkeyed, session);

        let (status, body) = call(define_routes(state), Method::GET, "/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["connections"], 1);
        assert_eq!(body["subscribed_tasks"], 0);
    }

    #[tokio::test]
    async fn health_counts_subscribed_tasks_separately() {
        let state = app_state();
        for scope in [Scope::Task("task-1".to_string()), Scope::Unkeyed] {
            let (session, _outbox) = state.live_manager.open_session();
            state.live_manager.register_connection(scope, session);
        }

        let (_, body) = call(define_routes(state), Method::GET, "/health", None).await;

        assert_eq!(body["connections"], 2);
        assert_eq!(body["subscribed_tasks"], 1);
    }

    #[tokio::test]
    async fn root_describes_the_service() {
        let (status, body) = call(define_routes(app_state()), Method::GET, "/", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Welcome to the Forex Companion API!");
        assert_eq!(body["docs"], "/docs");
    }

    #[tokio::test]
    async fn openapi_document_lists_the_http_routes() {
        let (status, body) = call(define_routes(app_state()), Method::GET, OPENAPI_JSON_PATH, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["info"]["title"], "Forex Companion API");
        let paths = body["paths"].as_object().unwrap();
        for path in [
            "/",
            "/health",
            "/api/tasks",
            "/api/tasks/{id}",
            "/api/tasks/{id}/pause",
            "/api/tasks/{id}/subscription",
            "/api/users/me",
        ] {
            assert!(paths.contains_key(path), "missing {path}");
        }
        assert!(paths["/api/tasks"].get("post").is_some());
        assert!(paths["/api/tasks/{id}"].get("delete").is_some());
    }

    #[tokio::test]
    async fn docs_page_is_served() {
        let request = Request::builder().uri("/docs").body(Body::empty()).unwrap();
        let response = define_routes(app_state()).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let page = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(page.contains("rapi-doc"));
        assert!(page.contains(OPENAPI_JSON_PATH));
    }

    #[tokio::test]
    async fn subscription_reflects_the_registry() {
        let state = app_state();
        let (session, _outbox) = state.live_manager.open_session();
        state
            .live_manager
            .register_connection(Scope::Task("task-1".to_string()), session);

        let app = define_routes(state);
        let (_, watched) = call(app.clone(), Method::GET, "/api/tasks/task-1/subscription", None).await;
        let (_, unwatched) = call(app, Method::GET, "/api/tasks/task-2/subscription", None).await;

        assert_eq!(watched["data"]["subscribed"], true);
        assert_eq!(unwatched["data"]["subscribed"], false);
    }

    #[tokio::test]
    async fn pausing_a_task_pushes_a_status_update_to_its_subscriber() {
        let state = app_state();
        let (session, mut outbox) = state.live_manager.open_session();
        state
            .live_manager
            .register_connection(Scope::Task("task-1".to_string()), session);

        let (status, body) = call(
            define_routes(state),
            Method::PUT,
            "/api/tasks/task-1/pause",
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!({"id": "task-1", "status": "paused"}));

        let frame: Value = serde_json::from_str(&outbox.next().await.unwrap()).unwrap();
        assert_eq!(frame["type"], "status");
        assert_eq!(frame["data"]["status"], "paused");
    }

    #[tokio::test]
    async fn create_uses_the_supplied_id() {
        let (status, body) = call(
            define_routes(app_state()),
            Method::POST,
            "/api/tasks",
            Some(json!({"id": "task-42", "pair": "USD/CHF"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status_code"], 201);
        assert_eq!(body["data"]["id"], "task-42");
        assert_eq!(body["data"]["task"]["pair"], "USD/CHF");
    }

    #[tokio::test]
    async fn create_rejects_non_object_bodies() {
        let (status, _) = call(
            define_routes(app_state()),
            Method::POST,
            "/api/tasks",
            Some(json!(["not", "an", "object"])),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn current_user_is_a_stub_record() {
        let (status, body) = call(define_routes(app_state()), Method::GET, "/api/users/me", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["id"], "user_1");
    }
}
