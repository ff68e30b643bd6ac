//! HTTP and WebSocket surface of the Forex Companion backend.

use axum::http::{HeaderValue, Method};
use axum::Router;
use events::DomainEvent;
use log::*;
use service::config::Config;
use std::future::Future;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};

pub use error::{Error, Result};
pub use service::AppState;

mod controller;
pub mod error;
pub mod router;
pub mod ws;

/// Binds the configured address and serves until Ctrl-C or SIGTERM.
pub async fn init_server(app_state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind(app_state.config.listen_address()).await?;
    info!("Server ready to accept connections on {}", listener.local_addr()?);

    serve(listener, app_state, shutdown_signal()).await
}

/// Serves on an already bound listener until `shutdown` resolves.
///
/// On shutdown every connected client is sent a notice and its session is
/// closed before the listener stops.
pub async fn serve<F>(listener: TcpListener, app_state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let live_manager = app_state.live_manager.clone();
    let event_publisher = app_state.event_publisher.clone();
    let app = build_app(app_state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!(
                "Shutting down, notifying {} live connection(s)",
                live_manager.connection_count()
            );
            event_publisher
                .publish(DomainEvent::ServerShutdown {
                    reason: "Server is shutting down".to_string(),
                })
                .await;
            let closed = live_manager.close_all();
            debug!("Closed {closed} live connection(s)");
        })
        .await
}

pub fn build_app(app_state: AppState) -> Router {
    let cors = cors_layer(&app_state.config);
    router::define_routes(app_state).layer(cors)
}

/// CORS policy from `allowed_origins`. Credentials are allowed, so a `*`
/// entry mirrors the request origin instead of sending a literal wildcard.
pub fn cors_layer(config: &Config) -> CorsLayer {
    let allow_origin = if config.allows_any_origin() {
        if config.is_production() {
            warn!("CORS allows any origin in production; set ALLOWED_ORIGINS to restrict it");
        }
        AllowOrigin::mirror_request()
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|origin| match origin.trim().parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Ignoring invalid CORS origin {origin:?}: {e}");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::mirror_request())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Received shutdown signal");
}
