//! Offline Agent Host - serves an application origin through the offline agent.
//!
//! Every request that is not an `/__agent/*` endpoint becomes a fetch event.
//! Application instances subscribe to `/__agent/clients` to receive relayed
//! sync messages.

mod clients;
mod handler;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use offline_agent::{
    AgentConfig, DynFetcher, HttpFetcher, NetworkConfig, OfflineAgent, RetryConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "offline-agent-host")]
#[command(about = "Offline caching agent for the telematics web application")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Origin and base path the agent controls (overrides the config file)
    #[arg(long)]
    scope: Option<Url>,

    /// SQLite database for cache generations
    #[arg(long, conflicts_with = "memory")]
    db: Option<PathBuf>,

    /// Keep cache generations in memory only
    #[arg(long)]
    memory: bool,
}

/// Default generation database under the user cache directory.
fn default_db_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("offline-agent")
        .join("generations.db")
}

fn load_config(args: &Args) -> Result<AgentConfig> {
    let mut config = match &args.config {
        Some(path) => AgentConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => AgentConfig::default(),
    };
    if let Some(scope) = &args.scope {
        config.scope = scope.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting offline agent host");

    let config = load_config(&args)?;
    info!(
        "Scope {} ({}-*-{})",
        config.scope, config.namespace, config.version
    );

    let fetcher: DynFetcher =
        Arc::new(HttpFetcher::with_timeout(NetworkConfig::REQUEST_TIMEOUT)?);
    let clients = clients::BroadcastClients::shared();

    let mut builder = OfflineAgent::builder(config)
        .with_fetcher(fetcher.clone())
        .with_clients(clients.clone());
    if !args.memory {
        builder = builder.sqlite_path(args.db.clone().unwrap_or_else(default_db_path));
    }
    let agent = builder.build()?;

    let state = server::AppState {
        agent: agent.clone(),
        fetcher,
        clients,
    };
    let addr = server::start_server(state, &args.host, args.port).await?;

    // Intentional stdout so a supervisor can discover an auto-assigned port
    println!("AGENT_PORT={}", addr.port());

    tokio::spawn(async move {
        if let Err(e) = server::bring_up(&agent, &RetryConfig::default()).await {
            error!("Agent did not come up, serving passthrough only: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    Ok(())
}
