//! Server module for the JSON-RPC surface.
//!
//! This module provides:
//! - A JSON-RPC 2.0 line protocol over stdio
//! - Method handlers and routing
//! - Shared application state

mod handlers;
mod rpc;

pub use handlers::*;
pub use rpc::*;

use std::sync::Arc;
use tracing::info;

use crate::api::MiningApi;
use crate::channel::{ChannelConnector, ChannelManager};
use crate::config::Config;
use crate::controller::SessionController;

/// Application state shared across handlers.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Owner of every claim session.
    pub controller: Arc<SessionController>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        config: Config,
        api: Arc<dyn MiningApi>,
        connector: Arc<dyn ChannelConnector>,
    ) -> Self {
        info!(
            semantics = %config.mining.semantics,
            depth = config.mining.depth,
            breadth = config.mining.breadth,
            idle_timeout_ms = config.channel.idle_timeout_ms,
            "AppState initializing"
        );

        let channel = ChannelManager::new(connector, config.channel.idle_timeout());
        let controller = Arc::new(SessionController::new(
            api,
            channel,
            config.api.api_key.clone(),
            config.mining,
        ));

        Self { config, controller }
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockMiningApi;
    use crate::config::{
        ApiConfig, ChannelConfig, LogFormat, LoggingConfig, MiningSettings, RequestConfig,
    };
    use crate::channel::SocketIoConnector;

    fn create_test_config() -> Config {
        Config {
            api: ApiConfig {
                api_key: "test-key".to_string(),
                base_url: "http://127.0.0.1:9".to_string(),
            },
            mining: MiningSettings::default(),
            channel: ChannelConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Pretty,
            },
            request: RequestConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_app_state_new() {
        let config = create_test_config();
        let connector = Arc::new(SocketIoConnector::new(
            &config.api.base_url,
            config.channel.namespace.clone(),
        ));
        let state = AppState::new(config, Arc::new(MockMiningApi::new()), connector);

        assert_eq!(state.config.api.api_key, "test-key");
        assert_eq!(state.controller.settings(), MiningSettings::default());
        assert!(state.controller.claims().await.is_empty());
    }
}
