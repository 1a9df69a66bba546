//! config-server is a sidecar serving static service credentials over HTTP.
//!
//! Every request, whatever its path or method, receives the same JSON
//! document.

use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};

use anyhow::{Context, Result};
use axum::{Json, Router, extract::State};
use clap::Parser;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "config-server")]
#[command(author, version, about = "Serve static service credentials to a co-located application")]
struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "CONFIG_SERVER_VERBOSITY", default_value_t = LevelFilter::INFO)]
    verbosity: LevelFilter,

    /// The port to listen on.
    #[arg(long, env = "CONFIG_SERVER_PORT")]
    port: u16,
}

/// The document served on every path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceCredentials {
    scope: String,
    password: String,
}

impl Default for ServiceCredentials {
    fn default() -> Self {
        Self {
            scope: "some-service.admin".to_string(),
            password: "not-a-real-p4$$w0rd".to_string(),
        }
    }
}

fn router(credentials: ServiceCredentials) -> Router {
    Router::new()
        .fallback(serve_credentials)
        .with_state(Arc::new(credentials))
}

async fn serve_credentials(
    State(credentials): State<Arc<ServiceCredentials>>,
) -> Json<ServiceCredentials> {
    tracing::debug!("Serving credentials");
    Json(credentials.as_ref().clone())
}

/// Serve until `shutdown` is cancelled.
async fn serve(
    listener: TcpListener,
    credentials: ServiceCredentials,
    shutdown: CancellationToken,
) -> Result<()> {
    axum::serve(listener, router(credentials))
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
        })
        .await
        .context("Config server failed")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let address = SocketAddr::from((Ipv4Addr::UNSPECIFIED, cli.port));
    let listener = TcpListener::bind(address)
        .await
        .context(format!("Failed to bind {address}"))?;
    tracing::info!(address = %listener.local_addr()?, "Config server listening");

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, shutting down...");
                shutdown.cancel();
            }
        }
    });

    serve(listener, ServiceCredentials::default(), shutdown).await
}
