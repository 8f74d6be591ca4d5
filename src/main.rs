use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use arg_claim_sessions::{
    api::MiningClient,
    channel::SocketIoConnector,
    config::{Config, LogFormat},
    server::{AppState, RpcServer},
};

/// JSON-RPC server for streamed argument-mining claim sessions.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Claims to load before serving requests, one per flag.
    #[arg(long = "claim")]
    claims: Vec<String>,

    /// Override LOG_LEVEL.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    // Initialize logging
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Claim session server starting..."
    );

    let api = match MiningClient::new(&config.api, config.request.clone()) {
        Ok(c) => {
            info!(base_url = %config.api.base_url, "Mining client initialized");
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize mining client");
            return Err(e.into());
        }
    };

    let connector = SocketIoConnector::new(&config.api.base_url, config.channel.namespace.clone());
    info!(url = %connector.url(), namespace = %config.channel.namespace, "Channel connector ready");

    let state = Arc::new(AppState::new(config, Arc::new(api), Arc::new(connector)));

    if !cli.claims.is_empty() {
        let claims = state.controller.load_claims(cli.claims).await;
        info!(claims = claims.len(), "Preloaded claims from the command line");
    }

    let server = RpcServer::new(state);

    info!("Server ready, waiting for requests on stdin...");

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
