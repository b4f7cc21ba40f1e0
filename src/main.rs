//! `atlas-agent` - the agent server binary.
//!
//! Loads `atlas.toml`, builds the skill registry and task runtime, mounts
//! the JSON-RPC gateway and MCP bridge, announces to the discovery
//! registry when one is configured, and serves until interrupted.

use atlas::api::handlers::card::build_agent_card;
use atlas::auth::rate_limit::CallerRateLimiter;
use atlas::auth::{NoAuthVerifier, StaticTokenVerifier, TokenVerifier};
use atlas::registry::announce::RegistryAnnouncer;
use atlas::runtime::RuntimeConfig;
use atlas::skills::SkillRegistry;
use atlas::{AgentRuntime, AppState, ConfigManager};
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

/// A.T.L.A.S agent server.
#[derive(Parser, Debug)]
#[command(
    name = "atlas-agent",
    version,
    about = "A.T.L.A.S - agent task server",
    long_about = "Serves this agent's skills over the JSON-RPC task protocol with SSE\n\
                  streaming, exposes them as MCP tools, and announces the agent card\n\
                  to a discovery registry when one is configured."
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

    let skills = Arc::new(SkillRegistry::with_builtin_skills());
    let runtime = AgentRuntime::start(
        RuntimeConfig {
            agent_id: config.agent.id.clone(),
            worker_count: config.runtime.worker_count,
            queue_depth: config.runtime.queue_depth_limit(),
            task_timeout: config.runtime.task_timeout(),
            record_history: config.runtime.record_history,
        },
        skills,
    );

    let verifier: Arc<dyn TokenVerifier> = match config.auth.bearer_secret() {
        Some(secret) => Arc::new(StaticTokenVerifier::new([secret.as_str()])),
        None => {
            warn!("no bearer secret configured, accepting anonymous callers");
            Arc::new(NoAuthVerifier)
        }
    };
    let limiter = Arc::new(CallerRateLimiter::new(
        config.auth.rate_limit_per_second,
        config.auth.rate_limit_burst,
    ));

    let state = AppState {
        config: config.clone(),
        runtime: runtime.clone(),
    };

    let shutdown = CancellationToken::new();
    if let Some(announcer) =
        RegistryAnnouncer::new(&config.registry, build_agent_card(&state))
    {
        if let Err(e) = announcer.announce_once().await {
            warn!("initial registry announcement failed: {e}");
        }
        tokio::spawn(announcer.run(shutdown.clone()));
    }

    let app = atlas::api::routes::create_router(verifier, limiter)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(agent = %config.agent.id, %addr, "atlas-agent listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    runtime.stop();
    info!("atlas-agent stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {e}");
    }
}
