//! Test utilities for Socksrelay
//!
//! Loopback servers and a minimal SOCKS5 client used across integration tests.

#![allow(dead_code)]

use socksrelay::config::Config;
use socksrelay::socks::auth::serialize_method_request;
use socksrelay::socks::{
    parse_connection_reply, serialize_connection_request, Command, RemoteConnector, Reply,
    TargetAddr,
};
use socksrelay::Server;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Start a server that echoes every byte back until the peer closes
pub async fn spawn_echo_server() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    addr
}

/// Start a server that writes `greeting` to each connection, then closes it
pub async fn spawn_greeting_server(greeting: &'static [u8]) -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let _ = stream.write_all(greeting).await;
            let _ = stream.shutdown().await;
        }
    });
    addr
}

/// Address nothing is listening on
pub async fn closed_port_addr() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    drop(listener);
    addr
}

/// A running proxy under test
pub struct TestProxy {
    /// Proxy listen address
    pub addr: SocketAddr,
    shutdown_tx: broadcast::Sender<bool>,
    handle: JoinHandle<()>,
}

impl TestProxy {
    /// Bind and run a proxy with `config`, optionally replacing its connector
    pub async fn start(mut config: Config, connector: Option<Arc<dyn RemoteConnector>>) -> Self {
        config.server.listen_addr = "127.0.0.1:0".to_string();

        let mut server = Server::bind(&config).await.unwrap();
        if let Some(connector) = connector {
            server = server.with_connector(connector);
        }
        let addr = server.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(async move {
            server.run(shutdown_rx).await.unwrap();
        });

        TestProxy {
            addr,
            shutdown_tx,
            handle,
        }
    }

    /// Stop accepting and wait for the accept loop to exit
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.handle.await;
    }
}

/// Connect to the proxy and complete no-auth negotiation
pub async fn socks5_negotiate(proxy: SocketAddr) -> TcpStream {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    stream.write_all(&serialize_method_request(&[0x00])).await.unwrap();

    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x05, 0x00]);
    stream
}

/// Send a request and read the IPv4 or IPv6 reply that follows
pub async fn socks5_request(stream: &mut TcpStream, command: Command, target: &TargetAddr) -> Reply {
    stream
        .write_all(&serialize_connection_request(command, target))
        .await
        .unwrap();

    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await.unwrap();
    let rest = match head[3] {
        0x04 => 16 + 2,
        _ => 4 + 2,
    };
    let mut reply = head.to_vec();
    reply.resize(4 + rest, 0);
    stream.read_exact(&mut reply[4..]).await.unwrap();

    parse_connection_reply(&reply).unwrap()
}

/// Read until the proxy closes the connection
pub async fn read_until_closed(stream: &mut TcpStream) -> Vec<u8> {
    let mut received = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut received))
        .await
        .expect("connection was not closed")
        .unwrap();
    received
}
