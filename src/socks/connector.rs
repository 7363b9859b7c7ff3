//! Remote connector
//!
//! Opens the outbound connection for a CONNECT request and wraps it in a
//! paused [`RelayEndpoint`].

use crate::error::ConnectError;
use crate::socks::relay::{EndpointEvent, RelayEndpoint, RelayOptions, Side};
use crate::socks::types::TargetAddr;
use crate::transport::StreamDyn;
use async_trait::async_trait;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// An opened outbound stream
pub struct RemoteStream {
    /// The connected stream
    pub stream: Box<dyn StreamDyn>,
    /// Local address of the outbound socket
    pub local_addr: Option<SocketAddr>,
    /// Address actually connected to
    pub peer_addr: Option<SocketAddr>,
}

impl RemoteStream {
    /// Wrap a connected stream with no known addresses
    pub fn new<S: StreamDyn + 'static>(stream: S) -> Self {
        RemoteStream {
            stream: Box::new(stream),
            local_addr: None,
            peer_addr: None,
        }
    }

    /// Record the local address
    pub fn with_local_addr(mut self, addr: Option<SocketAddr>) -> Self {
        self.local_addr = addr;
        self
    }

    /// Record the connected address
    pub fn with_peer_addr(mut self, addr: Option<SocketAddr>) -> Self {
        self.peer_addr = addr;
        self
    }
}

impl fmt::Debug for RemoteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteStream")
            .field("local_addr", &self.local_addr)
            .field("peer_addr", &self.peer_addr)
            .finish()
    }
}

/// Opens outbound connections to SOCKS targets
#[async_trait]
pub trait RemoteConnector: Send + Sync + 'static {
    /// Make exactly one connection attempt to `target`
    async fn open(&self, target: &TargetAddr) -> io::Result<RemoteStream>;
}

/// Connect to `target` within `timeout` and wrap the stream in a remote
/// endpoint whose reads stay paused until the session resumes them.
pub async fn connect_remote<E>(
    connector: &dyn RemoteConnector,
    target: &TargetAddr,
    timeout: Duration,
    events: mpsc::Sender<E>,
    opts: &RelayOptions,
) -> Result<RelayEndpoint, ConnectError>
where
    E: From<EndpointEvent> + Send + 'static,
{
    debug!("Connecting to {} (timeout {:?})", target, timeout);

    let remote = tokio::time::timeout(timeout, connector.open(target))
        .await
        .map_err(|_| ConnectError::Timeout(timeout))??;

    Ok(
        RelayEndpoint::spawn_paused(Side::Remote, remote.stream, events, opts)
            .with_peer_addr(remote.peer_addr)
            .with_local_addr(remote.local_addr),
    )
}
