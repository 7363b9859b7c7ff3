//! Server module for Socksrelay
//!
//! This module contains the listening side: binding the socket and handing
//! every accepted connection to its own SOCKS5 session.

#[allow(clippy::module_inception)]
mod server;

pub use server::Server;

use crate::config::Config;
use anyhow::{Context, Result};
use tokio::sync::broadcast;

/// Run the server with the given configuration
pub async fn run_server(config: Config, shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
    let server = Server::bind(&config)
        .await
        .with_context(|| format!("Failed to listen on {}", config.server.listen_addr))?;

    server.run(shutdown_rx).await?;
    Ok(())
}
