use anyhow::Result;
use clap::Parser;
use lattice_core::Relay;
use lattice_gateway::{run_event_pump, GatewayClient};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lattice=info")),
        )
        .init();

    let args = cli::Args::parse();
    let config = config::Config::load(&args.config)?;

    let pool = lattice_db::create_pool(&config.database.url, config.database.max_connections)
        .await?;
    lattice_db::run_migrations(&pool).await?;

    let client = GatewayClient::new(&config.gateway.base_url, &config.gateway.token)?;
    let relay = Relay::new(pool, Arc::new(client.clone()), config.relay_settings()).await?;

    let (tx, mut rx) = mpsc::channel(256);
    tokio::spawn(run_event_pump(client, tx));
    tracing::info!(target: "relay", "lattice relay started, consuming events");

    while let Some(event) = rx.recv().await {
        let relay = relay.clone();
        tokio::spawn(relay.dispatch(event));
    }
    tracing::info!(target: "relay", "event stream closed, shutting down");
    Ok(())
}
