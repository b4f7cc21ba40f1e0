//! `atlas-registry` - the standalone discovery registry service.
//!
//! Serves the agent directory over HTTP and runs the background health
//! poller that classifies registered agents by consecutive probe failures.

use atlas::AgentDirectory;
use atlas::registry::{api, health::HealthPoller};
use atlas::utils::toml_config::ConfigManager;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// A.T.L.A.S discovery registry service.
#[derive(Parser, Debug)]
#[command(
    name = "atlas-registry",
    version,
    about = "A.T.L.A.S - agent discovery registry"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "atlas.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let manager = ConfigManager::load(&cli.config)?;
    let config = manager.config();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(config.server.log_level.clone())
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let directory = Arc::new(AgentDirectory::new(config.discovery.failure_threshold));

    let shutdown = CancellationToken::new();
    let poller = HealthPoller::new(directory.clone(), &config.discovery);
    tokio::spawn(poller.run(shutdown.clone()));

    let app = api::create_router(directory)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let addr = format!("{}:{}", config.discovery.host, config.discovery.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "atlas-registry listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    info!("atlas-registry stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {e}");
    }
}
