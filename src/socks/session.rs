//! Per-connection SOCKS5 state machine
//!
//! A [`ClientSession`] owns the client endpoint for its whole life and the
//! remote endpoint from the moment the CONNECT attempt succeeds. All endpoint
//! notifications and the connect result arrive on one ordered channel and
//! are handled one at a time by [`ClientSession::step`].
//!
//! # Protocol Flow
//!
//! 1. AwaitingMethods: method negotiation, reply `05 00` or `05 FF`
//! 2. AwaitingRequest: parse the request, start the remote connect
//! 3. Connecting: wait for the connector, reply with the outcome
//! 4. Established: relay bytes both ways with backpressure

use crate::config::Config;
use crate::error::{CodecError, ConnectError};
use crate::socks::auth::{
    choose_method, parse_method_negotiation, serialize_method_reply, SUPPORTED_METHODS,
};
use crate::socks::command::{
    parse_connection_request, parse_connection_request_exact, serialize_connection_reply, Reply,
};
use crate::socks::connector::{connect_remote, RemoteConnector};
use crate::socks::relay::{CloseReason, EndpointEvent, RelayEndpoint, RelayOptions, Side, WriteStatus};
use crate::socks::types::{AddrType, AuthMethod, Command, ReplyCode, TargetAddr};
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument, Span};

/// Capacity of a session's event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Default bound on the remote connect attempt
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Runtime options shared by every session of a server
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Bound on resolving and connecting to the target
    pub connect_timeout: Duration,
    /// Reject requests whose length does not match their address type
    pub strict_request_length: bool,
    /// Report refused / network unreachable instead of host unreachable
    pub refine_reply_codes: bool,
    /// Report the remote socket's local address in the success reply
    pub report_bind_addr: bool,
    /// Endpoint buffering
    pub relay: RelayOptions,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            strict_request_length: false,
            refine_reply_codes: false,
            report_bind_addr: false,
            relay: RelayOptions::default(),
        }
    }
}

impl SessionOptions {
    /// Build session options from the server configuration
    pub fn from_config(config: &Config) -> Self {
        SessionOptions {
            connect_timeout: Duration::from_secs(config.socks.connect_timeout),
            strict_request_length: config.socks.strict_request_length,
            refine_reply_codes: config.socks.refine_reply_codes,
            report_bind_addr: config.socks.report_bind_addr,
            relay: RelayOptions {
                read_buffer_size: config.relay.read_buffer_size,
                high_water_mark: config.relay.high_water_mark,
                low_water_mark: config.relay.low_water_mark,
                ..Default::default()
            },
        }
    }
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the method negotiation request
    AwaitingMethods,
    /// Waiting for a method-specific sub-negotiation
    AwaitingAuth,
    /// Waiting for the connection request
    AwaitingRequest,
    /// Remote connect in progress
    Connecting,
    /// Relaying payload
    Established,
    /// Torn down
    Closed,
}

/// Bytes exchanged with the client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Traffic {
    /// Bytes written to the client, replies included
    pub tx: u64,
    /// Bytes received from the client, handshake included
    pub rx: u64,
}

/// Everything a session reacts to
#[derive(Debug)]
pub enum SessionEvent {
    /// Notification from the client or remote endpoint
    Endpoint(EndpointEvent),
    /// The remote connect attempt finished
    Connected(Result<RelayEndpoint, ConnectError>),
}

impl From<EndpointEvent> for SessionEvent {
    fn from(event: EndpointEvent) -> Self {
        SessionEvent::Endpoint(event)
    }
}

/// One accepted SOCKS5 client connection
pub struct ClientSession {
    state: SessionState,
    negotiated: bool,
    authenticated: bool,
    auth_method: Option<AuthMethod>,
    traffic: Traffic,
    client: RelayEndpoint,
    remote: Option<RelayEndpoint>,
    connector: Arc<dyn RemoteConnector>,
    options: Arc<SessionOptions>,
    events_tx: mpsc::Sender<SessionEvent>,
    events_rx: mpsc::Receiver<SessionEvent>,
    connect_task: Option<JoinHandle<()>>,
}

impl ClientSession {
    /// Start a session on an accepted client stream
    pub fn new<S>(
        stream: S,
        peer_addr: Option<SocketAddr>,
        connector: Arc<dyn RemoteConnector>,
        options: Arc<SessionOptions>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let client = RelayEndpoint::spawn(Side::Client, stream, events_tx.clone(), &options.relay)
            .with_peer_addr(peer_addr);

        ClientSession {
            state: SessionState::AwaitingMethods,
            negotiated: false,
            authenticated: false,
            auth_method: None,
            traffic: Traffic::default(),
            client,
            remote: None,
            connector,
            options,
            events_tx,
            events_rx,
            connect_task: None,
        }
    }

    /// Drive the session until both sides are torn down
    pub async fn run(mut self) -> Traffic {
        match self.client.peer_addr() {
            Some(addr) => info!("Peer connected: {}", addr),
            None => info!("Peer connected"),
        }

        while self.step().await {}

        info!(
            "Session finished: {} bytes sent, {} bytes received",
            self.traffic.tx, self.traffic.rx
        );
        self.traffic
    }

    /// Handle the next event. Returns false once the session is closed.
    pub async fn step(&mut self) -> bool {
        if self.state == SessionState::Closed {
            return false;
        }

        match self.events_rx.recv().await {
            Some(event) => self.handle_event(event),
            None => self.close("event channel closed"),
        }
        self.state != SessionState::Closed
    }

    fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Endpoint(EndpointEvent::Data(Side::Client, data)) => {
                self.on_client_data(data)
            }
            SessionEvent::Endpoint(EndpointEvent::Data(Side::Remote, data)) => {
                if self.state == SessionState::Established {
                    self.forward(Side::Remote, data);
                }
            }
            SessionEvent::Endpoint(EndpointEvent::Closed(side, reason)) => self.on_closed(side, reason),
            SessionEvent::Endpoint(EndpointEvent::Drained(side)) => self.on_drained(side),
            SessionEvent::Connected(result) => self.on_connected(result),
        }
    }

    fn on_client_data(&mut self, data: Bytes) {
        self.traffic.rx += data.len() as u64;

        match self.state {
            SessionState::AwaitingMethods => self.handle_method_negotiation(&data),
            SessionState::AwaitingAuth => {
                error!("No authentication handler for {:?}", self.auth_method);
                self.close("authentication not supported");
            }
            SessionState::AwaitingRequest => self.handle_connection_request(&data),
            SessionState::Connecting => {
                warn!("Received {} bytes before the remote connection was ready", data.len());
                self.close("unexpected data while connecting");
            }
            SessionState::Established => self.forward(Side::Client, data),
            SessionState::Closed => {}
        }
    }

    fn handle_method_negotiation(&mut self, data: &[u8]) {
        let request = match parse_method_negotiation(data) {
            Ok(request) => request,
            Err(e) => {
                error!("Method negotiation failed: {}", e);
                self.close("invalid method negotiation");
                return;
            }
        };

        let Some(method) = choose_method(&request.methods, SUPPORTED_METHODS) else {
            warn!("No acceptable authentication method in {:?}", request.methods);
            self.send(Bytes::copy_from_slice(&serialize_method_reply(None)));
            self.close("no acceptable authentication method");
            return;
        };

        self.send(Bytes::copy_from_slice(&serialize_method_reply(Some(method))));
        self.negotiated = true;
        self.auth_method = Some(method);

        if method.requires_challenge() {
            self.state = SessionState::AwaitingAuth;
        } else {
            self.authenticated = true;
            self.state = SessionState::AwaitingRequest;
        }
        debug!("Negotiated authentication method {:?}", method);
    }

    fn handle_connection_request(&mut self, data: &[u8]) {
        let parsed = if self.options.strict_request_length {
            parse_connection_request_exact(data)
        } else {
            parse_connection_request(data)
        };

        let request = match parsed {
            Ok(request) => request,
            Err(CodecError::UnsupportedCommand { command, addr_type }) => {
                match Command::from_byte(command) {
                    Some(known) => warn!("{} command not supported", known),
                    None => warn!("Unsupported command: {}", command),
                }
                self.reply_command_not_supported(AddrType::from_byte(addr_type));
                return;
            }
            Err(e) => {
                error!("Invalid connection request: {}", e);
                self.close("invalid connection request");
                return;
            }
        };

        self.start_connect(request.target);
    }

    fn reply_command_not_supported(&mut self, addr_type: Option<AddrType>) {
        let reply = Reply::unspecified(
            ReplyCode::CommandNotSupported,
            addr_type.unwrap_or(AddrType::Ipv4),
        );
        self.send(reply.to_bytes().into());
        self.close("command not supported");
    }

    fn start_connect(&mut self, target: TargetAddr) {
        info!("CONNECT request to {}", target);
        self.state = SessionState::Connecting;

        let connector = self.connector.clone();
        let options = self.options.clone();
        let events = self.events_tx.clone();

        self.connect_task = Some(tokio::spawn(async move {
            let result = connect_remote(
                connector.as_ref(),
                &target,
                options.connect_timeout,
                events.clone(),
                &options.relay,
            )
            .await;
            let _ = events.send(SessionEvent::Connected(result)).await;
        }
        .instrument(Span::current())));
    }

    fn on_connected(&mut self, result: Result<RelayEndpoint, ConnectError>) {
        if self.state != SessionState::Connecting {
            return;
        }
        self.connect_task = None;

        let mut remote = match result {
            Ok(remote) => remote,
            Err(e) => {
                warn!("Remote connection failed: {}", e);
                let code = if self.options.refine_reply_codes {
                    e.reply_code()
                } else {
                    ReplyCode::HostUnreachable
                };
                self.send(serialize_connection_reply(code, &TargetAddr::default()).into());
                self.close("remote connection failed");
                return;
            }
        };

        let bound = match remote.local_addr() {
            Some(addr) if self.options.report_bind_addr => TargetAddr::from(addr),
            _ => TargetAddr::default(),
        };
        match remote.peer_addr() {
            Some(addr) => info!("Connected to remote {}", addr),
            None => info!("Connected to remote"),
        }

        self.send(serialize_connection_reply(ReplyCode::Succeeded, &bound).into());
        self.state = SessionState::Established;
        remote.resume_reads();
        self.remote = Some(remote);
    }

    /// Write `data` to the endpoint opposite `from`, pausing `from` while
    /// the destination is congested.
    fn forward(&mut self, from: Side, data: Bytes) {
        let status = match from {
            Side::Client => match self.remote.as_mut() {
                Some(remote) => remote.write(data),
                None => WriteStatus::Closed,
            },
            Side::Remote => self.send(data),
        };

        if status == WriteStatus::Congested {
            if let Some(source) = self.endpoint_mut(from) {
                source.pause_reads();
            }
        }
    }

    fn on_drained(&mut self, side: Side) {
        if self.state != SessionState::Established {
            return;
        }
        if let Some(peer) = self.endpoint_mut(side.peer()) {
            peer.resume_reads();
        }
    }

    fn on_closed(&mut self, side: Side, reason: CloseReason) {
        match side {
            Side::Client => {
                info!("Peer connection lost: {}", reason);
                if let Some(remote) = self.remote.as_mut() {
                    remote.close("Host connection closed.");
                }
            }
            Side::Remote => {
                info!("Remote connection lost: {}", reason);
                self.client.close("Remote connection is lost.");
            }
        }
        self.close("peer closed");
    }

    fn send(&mut self, data: Bytes) -> WriteStatus {
        self.traffic.tx += data.len() as u64;
        self.client.write(data)
    }

    fn endpoint_mut(&mut self, side: Side) -> Option<&mut RelayEndpoint> {
        match side {
            Side::Client => Some(&mut self.client),
            Side::Remote => self.remote.as_mut(),
        }
    }

    fn close(&mut self, reason: &str) {
        if self.state == SessionState::Closed {
            return;
        }
        debug!("Closing session: {}", reason);
        self.state = SessionState::Closed;

        if let Some(task) = self.connect_task.take() {
            task.abort();
        }
        self.client.close(reason);
        if let Some(remote) = self.remote.as_mut() {
            remote.close(reason);
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether a method was agreed on
    pub fn is_negotiated(&self) -> bool {
        self.negotiated
    }

    /// Whether the client may send a request
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// The agreed method, if any
    pub fn auth_method(&self) -> Option<AuthMethod> {
        self.auth_method
    }

    /// Bytes exchanged with the client so far
    pub fn traffic(&self) -> Traffic {
        self.traffic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socks::connector::RemoteStream;
    use crate::socks::consts::*;
    use async_trait::async_trait;
    use std::io;
    use std::net::Ipv4Addr;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::sync::Mutex;

    struct DuplexConnector(Mutex<Option<DuplexStream>>);

    #[async_trait]
    impl RemoteConnector for DuplexConnector {
        async fn open(&self, _target: &TargetAddr) -> io::Result<RemoteStream> {
            self.0
                .lock()
                .await
                .take()
                .map(|stream| {
                    RemoteStream::new(stream).with_local_addr(Some("192.0.2.7:4321".parse().unwrap()))
                })
                .ok_or_else(|| io::Error::from(io::ErrorKind::ConnectionRefused))
        }
    }

    struct PendingConnector;

    #[async_trait]
    impl RemoteConnector for PendingConnector {
        async fn open(&self, _target: &TargetAddr) -> io::Result<RemoteStream> {
            std::future::pending().await
        }
    }

    struct RefusingConnector;

    #[async_trait]
    impl RemoteConnector for RefusingConnector {
        async fn open(&self, _target: &TargetAddr) -> io::Result<RemoteStream> {
            Err(io::Error::from(io::ErrorKind::ConnectionRefused))
        }
    }

    const CONNECT_IPV4: [u8; 10] = [0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1, 0x1F, 0x90];

    fn session_with(
        connector: Arc<dyn RemoteConnector>,
        options: SessionOptions,
    ) -> (ClientSession, DuplexStream) {
        let (far, near) = duplex(4096);
        let session = ClientSession::new(near, None, connector, Arc::new(options));
        (session, far)
    }

    fn session() -> (ClientSession, DuplexStream) {
        session_with(Arc::new(RefusingConnector), SessionOptions::default())
    }

    async fn step(session: &mut ClientSession) -> bool {
        tokio::time::timeout(Duration::from_secs(2), session.step())
            .await
            .expect("session stalled")
    }

    async fn negotiate(session: &mut ClientSession, client: &mut DuplexStream) {
        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        assert!(step(session).await);
        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0x00]);
    }

    async fn read_all(stream: &mut DuplexStream) -> Vec<u8> {
        let mut received = Vec::new();
        tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut received))
            .await
            .expect("stream not closed")
            .unwrap();
        received
    }

    #[tokio::test]
    async fn test_negotiation_no_auth() {
        let (mut session, mut client) = session();
        negotiate(&mut session, &mut client).await;

        assert_eq!(session.state(), SessionState::AwaitingRequest);
        assert!(session.is_negotiated());
        assert!(session.is_authenticated());
        assert_eq!(session.auth_method(), Some(AuthMethod::NoAuth));
    }

    #[tokio::test]
    async fn test_negotiation_prefers_first_supported() {
        let (mut session, mut client) = session();
        client
            .write_all(&[0x05, 0x03, SOCKS5_AUTH_METHOD_PASSWORD, 0x80, SOCKS5_AUTH_METHOD_NONE])
            .await
            .unwrap();
        assert!(step(&mut session).await);

        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NONE]);
    }

    #[tokio::test]
    async fn test_negotiation_malformed_closes_silently() {
        let cases: [&[u8]; 3] = [&[0x05, 0x00], &[0x05, 0x00, 0x00], &[0x05, 0x02, 0x00]];

        for payload in cases {
            let (mut session, mut client) = session();
            client.write_all(payload).await.unwrap();
            assert!(!step(&mut session).await);

            assert_eq!(session.state(), SessionState::Closed);
            assert!(!session.is_negotiated());
            assert!(!session.is_authenticated());
            assert!(read_all(&mut client).await.is_empty());
        }
    }

    #[tokio::test]
    async fn test_negotiation_no_acceptable_method() {
        let (mut session, mut client) = session();
        client.write_all(&[0x05, 0x01, 0xFF]).await.unwrap();
        assert!(!step(&mut session).await);

        assert!(!session.is_negotiated());
        assert!(!session.is_authenticated());
        assert_eq!(read_all(&mut client).await, vec![0x05, 0xFF]);
    }

    #[tokio::test]
    async fn test_request_malformed_closes_without_reply() {
        let cases: [&[u8]; 3] = [
            &[0x00],
            &[0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
            &[0x05, 0x01, 0x00, 0x09, 0x00, 0x00, 0x00],
        ];

        for payload in cases {
            let (mut session, mut client) = session();
            negotiate(&mut session, &mut client).await;

            client.write_all(payload).await.unwrap();
            assert!(!step(&mut session).await);
            assert!(read_all(&mut client).await.is_empty());
        }
    }

    #[tokio::test]
    async fn test_request_unknown_command() {
        let (mut session, mut client) = session();
        negotiate(&mut session, &mut client).await;

        client
            .write_all(&[0x05, 0xFF, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00])
            .await
            .unwrap();
        assert!(!step(&mut session).await);
        assert_eq!(
            read_all(&mut client).await,
            vec![0x05, 0x07, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[tokio::test]
    async fn test_request_unknown_command_unknown_atyp() {
        let (mut session, mut client) = session();
        negotiate(&mut session, &mut client).await;

        client
            .write_all(&[0x05, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x00])
            .await
            .unwrap();
        assert!(!step(&mut session).await);
        assert_eq!(
            read_all(&mut client).await,
            vec![0x05, 0x07, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[tokio::test]
    async fn test_known_command_with_bad_address_still_replied() {
        // Truncated IPv4 address, then an unknown address type
        let requests: [&[u8]; 2] = [
            &[0x05, SOCKS5_CMD_TCP_BIND, 0x00, 0x01, 0x00, 0x00, 0x00],
            &[0x05, SOCKS5_CMD_UDP_ASSOCIATE, 0x00, 0x00, 0x00, 0x00, 0x00],
        ];

        for payload in requests {
            let (mut session, mut client) = session();
            negotiate(&mut session, &mut client).await;

            client.write_all(payload).await.unwrap();
            assert!(!step(&mut session).await);
            assert_eq!(
                read_all(&mut client).await,
                vec![0x05, 0x07, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
            );
        }
    }

    #[tokio::test]
    async fn test_empty_domain_replies_host_unreachable() {
        let connector = Arc::new(crate::transport::TcpConnector::with_defaults());
        let (mut session, mut client) = session_with(connector, SessionOptions::default());
        negotiate(&mut session, &mut client).await;

        client
            .write_all(&[0x05, 0x01, 0x00, SOCKS5_ADDR_TYPE_DOMAIN, 0x00, 0x00, 0x50])
            .await
            .unwrap();
        assert!(step(&mut session).await);
        assert!(!step(&mut session).await);

        assert_eq!(
            read_all(&mut client).await,
            vec![0x05, SOCKS5_REPLY_HOST_UNREACHABLE, 0x00, 0x01, 0, 0, 0, 0, 0, 0]
        );
    }

    #[tokio::test]
    async fn test_request_bind_not_supported() {
        let (mut session, mut client) = session();
        negotiate(&mut session, &mut client).await;

        let mut request = vec![0x05, SOCKS5_CMD_TCP_BIND, 0x00, SOCKS5_ADDR_TYPE_IPV6];
        request.extend_from_slice(&[0xAB; 16]);
        request.extend_from_slice(&[0x00, 0x50]);
        client.write_all(&request).await.unwrap();
        assert!(!step(&mut session).await);

        let reply = read_all(&mut client).await;
        assert_eq!(&reply[..4], &[0x05, 0x07, 0x00, SOCKS5_ADDR_TYPE_IPV6]);
        assert_eq!(reply.len(), 4 + 16 + 2);
        assert!(reply[4..].iter().all(|b| *b == 0));
    }

    #[tokio::test]
    async fn test_strict_request_length() {
        let options = SessionOptions {
            strict_request_length: true,
            ..Default::default()
        };
        let (mut session, mut client) = session_with(Arc::new(RefusingConnector), options);
        negotiate(&mut session, &mut client).await;

        let mut request = CONNECT_IPV4.to_vec();
        request.insert(8, 0xEE);
        client.write_all(&request).await.unwrap();
        assert!(!step(&mut session).await);
        assert!(read_all(&mut client).await.is_empty());
    }

    #[tokio::test]
    async fn test_connect_and_relay() {
        let (mut remote, remote_near) = duplex(4096);
        let connector = Arc::new(DuplexConnector(Mutex::new(Some(remote_near))));
        let (mut session, mut client) = session_with(connector, SessionOptions::default());
        negotiate(&mut session, &mut client).await;

        client.write_all(&CONNECT_IPV4).await.unwrap();
        assert!(step(&mut session).await);
        assert_eq!(session.state(), SessionState::Connecting);
        assert!(step(&mut session).await);
        assert_eq!(session.state(), SessionState::Established);

        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);

        client.write_all(b"ping").await.unwrap();
        assert!(step(&mut session).await);
        let mut buf = [0u8; 4];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        remote.write_all(b"pong").await.unwrap();
        assert!(step(&mut session).await);
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");

        drop(client);
        assert!(!step(&mut session).await);
        assert!(read_all(&mut remote).await.is_empty());

        assert_eq!(session.traffic(), Traffic { tx: 16, rx: 17 });
    }

    #[tokio::test]
    async fn test_report_bind_addr() {
        let (_remote, remote_near) = duplex(64);
        let connector = Arc::new(DuplexConnector(Mutex::new(Some(remote_near))));
        let options = SessionOptions {
            report_bind_addr: true,
            ..Default::default()
        };
        let (mut session, mut client) = session_with(connector, options);
        negotiate(&mut session, &mut client).await;

        client.write_all(&CONNECT_IPV4).await.unwrap();
        assert!(step(&mut session).await);
        assert!(step(&mut session).await);

        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply[..4], &[0x05, 0x00, 0x00, 0x01]);
        assert_eq!(&reply[4..8], &Ipv4Addr::new(192, 0, 2, 7).octets());
        assert_eq!(&reply[8..], &4321u16.to_be_bytes());
    }

    #[tokio::test]
    async fn test_remote_close_closes_client() {
        let (remote, remote_near) = duplex(64);
        let connector = Arc::new(DuplexConnector(Mutex::new(Some(remote_near))));
        let (mut session, mut client) = session_with(connector, SessionOptions::default());
        negotiate(&mut session, &mut client).await;

        client.write_all(&CONNECT_IPV4).await.unwrap();
        assert!(step(&mut session).await);
        assert!(step(&mut session).await);

        drop(remote);
        assert!(!step(&mut session).await);
        assert_eq!(read_all(&mut client).await.len(), 10);
    }

    #[tokio::test]
    async fn test_connect_timeout_replies_host_unreachable() {
        let options = SessionOptions {
            connect_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let (mut session, mut client) = session_with(Arc::new(PendingConnector), options);
        negotiate(&mut session, &mut client).await;

        client.write_all(&CONNECT_IPV4).await.unwrap();
        assert!(step(&mut session).await);
        assert!(!step(&mut session).await);

        assert_eq!(
            read_all(&mut client).await,
            vec![0x05, SOCKS5_REPLY_HOST_UNREACHABLE, 0x00, 0x01, 0, 0, 0, 0, 0, 0]
        );
    }

    #[tokio::test]
    async fn test_connect_refused_reply_codes() {
        for (refine, expected) in [
            (false, SOCKS5_REPLY_HOST_UNREACHABLE),
            (true, SOCKS5_REPLY_CONNECTION_REFUSED),
        ] {
            let options = SessionOptions {
                refine_reply_codes: refine,
                ..Default::default()
            };
            let (mut session, mut client) = session_with(Arc::new(RefusingConnector), options);
            negotiate(&mut session, &mut client).await;

            client.write_all(&CONNECT_IPV4).await.unwrap();
            assert!(step(&mut session).await);
            assert!(!step(&mut session).await);

            let reply = read_all(&mut client).await;
            assert_eq!(reply[1], expected);
        }
    }

    #[tokio::test]
    async fn test_data_while_connecting_closes() {
        let (mut session, mut client) = session_with(Arc::new(PendingConnector), SessionOptions::default());
        negotiate(&mut session, &mut client).await;

        client.write_all(&CONNECT_IPV4).await.unwrap();
        assert!(step(&mut session).await);

        client.write_all(b"too early").await.unwrap();
        assert!(!step(&mut session).await);
        assert!(read_all(&mut client).await.is_empty());
    }

    #[tokio::test]
    async fn test_backpressure_pauses_client_until_remote_drains() {
        const TOTAL: usize = 2 * 1024 * 1024;

        let (mut remote, remote_near) = duplex(1024);
        let connector = Arc::new(DuplexConnector(Mutex::new(Some(remote_near))));
        let options = SessionOptions {
            relay: RelayOptions {
                high_water_mark: 4096,
                low_water_mark: 1024,
                ..Default::default()
            },
            ..Default::default()
        };
        let (mut session, mut client) = session_with(connector, options);
        negotiate(&mut session, &mut client).await;

        client.write_all(&CONNECT_IPV4).await.unwrap();
        assert!(step(&mut session).await);
        assert!(step(&mut session).await);
        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();

        let session_task = tokio::spawn(session.run());

        let payload: Vec<u8> = (0..TOTAL).map(|i| (i % 251) as u8).collect();
        let expected = payload.clone();
        let writer = tokio::spawn(async move {
            client.write_all(&payload).await.unwrap();
            client
        });

        // Nobody reads the remote yet, so the client side must stall
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!writer.is_finished());

        let mut received = vec![0u8; TOTAL];
        tokio::time::timeout(Duration::from_secs(5), remote.read_exact(&mut received))
            .await
            .expect("relay stalled")
            .unwrap();
        assert!(received == expected);

        let client = writer.await.unwrap();
        drop(client);
        let traffic = tokio::time::timeout(Duration::from_secs(2), session_task)
            .await
            .expect("session did not finish")
            .unwrap();
        assert_eq!(traffic.rx, (3 + CONNECT_IPV4.len() + TOTAL) as u64);
    }
}
