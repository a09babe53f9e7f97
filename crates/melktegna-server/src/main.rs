//! melktegna-server: real-time relay for Melktegna chat.
//!
//! Accepts WebSocket connections, binds announced users to their live
//! connection, and relays chat messages between them.

use clap::Parser;
use melktegna_server::{ChatServer, ConfigOverrides, ServerConfig};
use std::path::PathBuf;
use tracing::{error, info};

/// melktegna-server: chat presence and message relay
#[derive(Parser, Debug)]
#[command(name = "melktegna-server", version, about = "Chat presence and message relay")]
struct Cli {
    /// Listen address
    #[arg(long)]
    host: Option<String>,

    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Config file path
    #[arg(long, default_value = "~/.melktegna/server.toml")]
    config: String,

    /// Outbound events buffered per connection
    #[arg(long)]
    outbound_queue: Option<usize>,

    /// Disable the in-memory message history
    #[arg(long)]
    no_history: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    use tracing_subscriber::EnvFilter;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting melktegna-server");

    let config_path = PathBuf::from(&cli.config);
    let overrides = ConfigOverrides {
        host: cli.host,
        port: cli.port,
        outbound_queue: cli.outbound_queue,
        no_history: cli.no_history,
    };
    let config = match ServerConfig::load(Some(&config_path), overrides) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    let handle = match ChatServer::new(config).spawn().await {
        Ok(h) => h,
        Err(e) => {
            error!(error = %e, "failed to start server");
            std::process::exit(1);
        }
    };

    shutdown_signal().await;
    info!("received shutdown signal");
    handle.shutdown().await;

    info!("melktegna-server stopped");
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
