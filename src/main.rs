// src/main.rs

use grid_relay::{config::Config, server};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// The main entry point for the relay.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let config = Config::from_env()?;
    info!(
        addr = %config.bind_addr(),
        database_url = %config.database_url,
        mailbox_capacity = config.rooms.mailbox_capacity,
        echo_to_sender = config.rooms.echo_to_sender,
        "configuration loaded"
    );

    server::run(config).await?;
    Ok(())
}
