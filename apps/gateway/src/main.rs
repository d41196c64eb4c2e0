//! Store Gateway - forwards client requests to the upstream vector store
//! with the server-held API key injected.

use core_config::tracing::{init_tracing, install_color_eyre};
use std::net::SocketAddr;
use tracing::info;

mod config;
mod proxy;

use config::Config;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Install color-eyre first for colored error output
    install_color_eyre();

    // Missing upstream credentials abort here with a remediation hint
    let config = Config::from_env()?;

    init_tracing(&config.environment);

    let app = proxy::router(&config)?;
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    info!("Starting store gateway on {} -> {}", addr, config.store_url);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
