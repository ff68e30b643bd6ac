use log::{error, info};
use service::{config::Config, logging::Logger, AppState};

#[tokio::main]
async fn main() {
    let config = Config::new();
    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to start logger: {e}");
        std::process::exit(1);
    }

    info!("🚀 Starting Forex Companion Backend...");
    info!(
        "Runtime environment: {}, allowed origins: {:?}",
        config.runtime_env(),
        config.allowed_origins
    );

    let app_state = AppState::from_config(config);

    if let Err(e) = web::init_server(app_state).await {
        error!("Server failed: {e}");
        std::process::exit(1);
    }

    info!("👋 Forex Companion Backend shut down");
}
