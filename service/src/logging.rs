//! Terminal logging for the backend, built on `simplelog`.

use crate::config::Config;
use log::SetLoggerError;
use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode};

/// Crates that log every WebSocket frame through `log`. They are only shown
/// at Trace.
const TRANSPORT_MODULES: &[&str] = &["tungstenite", "tokio_tungstenite"];

pub struct Logger {
    level: LevelFilter,
}

impl Logger {
    pub fn from_config(config: &Config) -> Self {
        Self {
            level: config.log_level_filter,
        }
    }

    /// Installs the process-wide logger described by `config`.
    pub fn init_logger(config: &Config) -> Result<(), SetLoggerError> {
        Self::from_config(config).install()
    }

    pub fn install(self) -> Result<(), SetLoggerError> {
        let term_config = self.term_config();
        TermLogger::init(
            self.level,
            term_config,
            TerminalMode::Mixed,
            ColorChoice::Auto,
        )
    }

    fn hides_transport(&self) -> bool {
        self.level < LevelFilter::Trace
    }

    fn term_config(&self) -> simplelog::Config {
        let mut builder = ConfigBuilder::new();
        builder
            .set_time_format_rfc3339()
            .set_target_level(LevelFilter::Error);

        if self.hides_transport() {
            for module in TRANSPORT_MODULES {
                builder.add_filter_ignore_str(module);
            }
        }

        builder.build()
    }
}
