//! Fragment registry service.
//!
//! # Architecture Overview
//!
//! ```text
//!   Renderer / browser                          Operator (registry-cli, admin UI)
//!          │                                              │
//!          ▼                                              ▼
//!  ┌──────────────────┐                       ┌──────────────────────┐
//!  │ http::config_api │                       │ admin (auth, CRUD)   │
//!  └────────┬─────────┘                       └──────────┬───────────┘
//!           │                                            │
//!           ▼                                            ▼
//!  ┌──────────────────┐   invalidate          ┌──────────────────────┐
//!  │ ConfigResolver   │◀──────────────────────│ VersioningService    │
//!  │  CacheWrapper    │                       │  sanitize / revert   │
//!  │  domain scoping  │                       └──────────┬───────────┘
//!  │  RouteTable      │                                  │
//!  └────────┬─────────┘                                  ▼
//!           │ ConfigSource                      ┌──────────────────────┐
//!           └──────────────────────────────────▶│ SQLite (db::*)       │
//!                  (or upstream registry)       └──────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use fragment_registry::config::resolve_config;
use fragment_registry::http::HttpServer;
use fragment_registry::lifecycle::{build_state, spawn_signal_listener, Shutdown};
use fragment_registry::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "fragment-registry")]
#[command(about = "Micro-frontend composition registry", long_about = None)]
struct Args {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "REGISTRY_CONFIG")]
    config: Option<PathBuf>,

    /// Admin API key, overriding `admin.api_key`.
    #[arg(long, env = "REGISTRY_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = resolve_config(args.config.as_deref(), args.api_key.clone())?;

    logging::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "fragment-registry starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        database = %config.database.url,
        upstream = ?config.upstream.registry_url,
        cache_secs = config.cache.config_cache_secs,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );
    if args.config.is_none() {
        tracing::warn!("No configuration file given; running with defaults");
    }

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let bind_address = config.listener.bind_address.clone();
    let state = build_state(config).await?;

    // Bind last: traffic only arrives once the state is ready.
    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Arc::new(Shutdown::new());
    spawn_signal_listener(Arc::clone(&shutdown));

    HttpServer::new(state).run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
