//! TCP remote connector
//!
//! Opens plain TCP connections to SOCKS5 targets.

use super::SocketOpts;
use crate::config::TcpConfig;
use crate::socks::{RemoteConnector, RemoteStream, TargetAddr};
use async_trait::async_trait;
use std::io;
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Connector that dials targets over TCP
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    /// Socket options to apply to connections
    socket_opts: SocketOpts,
}

impl TcpConnector {
    /// Create a new TCP connector with default options
    pub fn with_defaults() -> Self {
        Self::default()
    }

    /// Create a TCP connector from configuration
    pub fn new(config: &TcpConfig) -> Self {
        TcpConnector {
            socket_opts: SocketOpts::from_tcp_config(config),
        }
    }

    /// Set socket options
    pub fn with_socket_opts(mut self, opts: SocketOpts) -> Self {
        self.socket_opts = opts;
        self
    }
}

#[async_trait]
impl RemoteConnector for TcpConnector {
    async fn open(&self, target: &TargetAddr) -> io::Result<RemoteStream> {
        let resolved = target.resolve().await?;
        let stream = TcpStream::connect(resolved).await?;

        if let Err(e) = self.socket_opts.apply(&stream) {
            warn!("Failed to apply socket options: {}", e);
        }

        debug!("TCP connection established to {}", resolved);

        let local_addr = stream.local_addr().ok();
        Ok(RemoteStream::new(stream)
            .with_peer_addr(Some(resolved))
            .with_local_addr(local_addr))
    }
}
