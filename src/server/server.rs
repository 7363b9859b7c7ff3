//! Listening server
//!
//! Accepts client connections and runs one [`ClientSession`] per connection.

use crate::config::Config;
use crate::error::ServerError;
use crate::socks::{ClientSession, RemoteConnector, SessionOptions};
use crate::transport::{SocketOpts, TcpConnector};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Pause after a failed accept before trying again
const ACCEPT_ERROR_DELAY: Duration = Duration::from_millis(100);

/// SOCKS5 listening server
pub struct Server {
    listener: TcpListener,
    connector: Arc<dyn RemoteConnector>,
    options: Arc<SessionOptions>,
    socket_opts: SocketOpts,
}

impl Server {
    /// Bind the listening socket described by `config`
    pub async fn bind(config: &Config) -> Result<Self, ServerError> {
        let addr = tokio::net::lookup_host(&config.server.listen_addr)
            .await?
            .next()
            .ok_or_else(|| {
                ServerError::Config(format!(
                    "Cannot resolve listen address: {}",
                    config.server.listen_addr
                ))
            })?;

        let listener = bind_listener(addr, config.server.backlog)?;

        Ok(Server {
            listener,
            connector: Arc::new(TcpConnector::new(&config.tcp)),
            options: Arc::new(SessionOptions::from_config(config)),
            socket_opts: SocketOpts::from_tcp_config(&config.tcp),
        })
    }

    /// Replace the connector used for CONNECT requests
    pub fn with_connector(mut self, connector: Arc<dyn RemoteConnector>) -> Self {
        self.connector = connector;
        self
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until shutdown
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<bool>) -> Result<(), ServerError> {
        info!("Listening on {}", self.local_addr()?);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.spawn_session(stream, addr),
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        tokio::time::sleep(ACCEPT_ERROR_DELAY).await;
                    }
                },
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping server");
                    break;
                }
            }
        }

        Ok(())
    }

    fn spawn_session(&self, stream: TcpStream, addr: SocketAddr) {
        if let Err(e) = self.socket_opts.apply(&stream) {
            warn!("Failed to apply socket options for {}: {}", addr, e);
        }

        let connector = self.connector.clone();
        let options = self.options.clone();

        tokio::spawn(
            async move {
                let traffic = ClientSession::new(stream, Some(addr), connector, options)
                    .run()
                    .await;
                debug!("Session traffic: {:?}", traffic);
            }
            .instrument(info_span!("session", peer = %addr)),
        );
    }
}

fn bind_listener(addr: SocketAddr, backlog: u32) -> Result<TcpListener, ServerError> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(i32::try_from(backlog).unwrap_or(i32::MAX))?;

    Ok(TcpListener::from_std(socket.into())?)
}
