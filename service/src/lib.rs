use config::Config;
use events::EventPublisher;
use live::domain_event_handler::LiveUpdateEventHandler;
use std::sync::Arc;

pub mod config;
pub mod logging;

// Service-level state shared by every route and WebSocket session.
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub live_manager: Arc<live::Manager>,
    pub event_publisher: EventPublisher,
}

impl AppState {
    pub fn new(
        app_config: Config,
        live_manager: Arc<live::Manager>,
        event_publisher: EventPublisher,
    ) -> Self {
        Self {
            config: app_config,
            live_manager,
            event_publisher,
        }
    }

    /// Builds the live manager from config and wires domain events into it.
    pub fn from_config(app_config: Config) -> Self {
        let live_manager = Arc::new(live::Manager::with_outbound_capacity(
            app_config.ws_outbound_queue_capacity,
        ));
        let event_publisher = EventPublisher::new()
            .with_handler(Arc::new(LiveUpdateEventHandler::new(live_manager.clone())));

        Self::new(app_config, live_manager, event_publisher)
    }
}
