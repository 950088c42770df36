use std::net::{IpAddr, SocketAddr};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wren::api;
use wren::cli;
use wren::node::NodeRegistry;

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "wren=debug,tower_http=debug".into());
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed listening for shutdown signal: {}", e);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse args and env vars
    let settings = cli::Cli::parse().into_settings();
    init_tracing(settings.log_json);

    // Socket server listen address setup
    let listen_address: IpAddr = settings
        .listen_address
        .parse::<IpAddr>()
        .context("Invalid ip address")?;
    let socket_address = SocketAddr::from((listen_address, settings.listen_port));

    // Join the partition and start a bridge per hosted node
    let registry = NodeRegistry::new(settings).await?;

    // Build Axum Router
    let api = api::api(registry.clone()).await?;

    // Start server
    info!("Starting Wren on {}", socket_address);
    axum::Server::bind(&socket_address)
        .serve(api.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Stopping bridges");
    registry.shutdown().await;
    Ok(())
}
