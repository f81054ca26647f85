use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::prelude::*;

use hashchat::AppState;
use hashchat::config::{FileConfig, RelayConfig, ServerConfig, load_config};

#[derive(Parser)]
#[command(name = "hashchat")]
#[command(about = "Public-key directory and WebSocket relay for end-to-end encrypted chat")]
struct Cli {
    /// Path to the TOML config file (missing file = defaults)
    #[arg(short, long, default_value = "hashchat.toml")]
    config: PathBuf,

    /// Host to bind to (overrides config)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Port for the web server (overrides config, 0 = auto-select)
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_directive = if cli.debug {
        "hashchat=debug,tower_http=debug,info"
    } else {
        "hashchat=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let mut file_config: FileConfig = load_config(&cli.config)
        .extract()
        .with_context(|| format!("Invalid configuration in {}", cli.config.display()))?;
    if let Some(host) = cli.host {
        file_config.server.host = host;
    }
    if let Some(port) = cli.port {
        file_config.server.port = port;
    }

    let server_config = ServerConfig::from_file(&file_config.server);
    let relay_config = RelayConfig::from_file(&file_config.relay);
    info!(
        "Relay config: outbound_queue={}, send_timeout={:?}, max_message={}KB",
        relay_config.outbound_queue,
        relay_config.send_timeout,
        relay_config.max_message_bytes / 1024
    );

    let state = AppState::new(relay_config);
    let relay_for_shutdown = state.relay.clone();
    let app = hashchat::build_router(state);

    let addr = server_config
        .bind_addr()
        .parse::<SocketAddr>()
        .with_context(|| format!("Invalid bind address {}", server_config.bind_addr()))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let actual_addr = listener.local_addr()?;

    info!("Hashchat listening on http://{}", actual_addr);
    info!("API endpoints:");
    info!("  POST   /register                    - Register username + public key");
    info!("  GET    /users                       - List registered users");
    info!("  GET    /users/:username/public-key  - Look up a public key");
    info!("  GET    /health                      - Health and connection counts");
    info!("  GET    /health/live                 - Liveness probe");
    info!("  GET    /metrics                     - Relay counters");
    info!("  GET    /ws                          - WebSocket relay");

    // Upgraded sockets are not tracked by graceful shutdown; cancel them here.
    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, closing relay connections...");
        relay_for_shutdown.shutdown();
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}
