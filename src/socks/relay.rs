//! Relay endpoints
//!
//! A [`RelayEndpoint`] wraps one full-duplex stream (client or remote side)
//! with a reader task and a writer task. Everything the tasks observe is
//! reported to the owning session over its event channel, so the session is
//! the only place that decides what happens next:
//!
//! ```text
//!             +---------------- ClientSession ----------------+
//!  client --> | reader -> Data(Client) -> remote.write()      | --> remote
//!  client <-- | client.write() <- Data(Remote) <- reader      | <-- remote
//!             |   Congested  -> peer.pause_reads()            |
//!             |   Drained    -> peer.resume_reads()           |
//!             +-----------------------------------------------+
//! ```

use bytes::Bytes;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, Instrument, Span};

/// Default read chunk size
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8192;

/// Default queued-bytes threshold above which an endpoint reports congestion
pub const DEFAULT_HIGH_WATER_MARK: usize = 64 * 1024;

/// Default queued-bytes threshold at which a congested endpoint reports drained
pub const DEFAULT_LOW_WATER_MARK: usize = 16 * 1024;

/// How long a closed endpoint may keep flushing queued bytes
pub const DEFAULT_CLOSE_LINGER: Duration = Duration::from_secs(5);

/// Which side of a proxied connection an endpoint serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The SOCKS client
    Client,
    /// The target host
    Remote,
}

impl Side {
    /// The opposite side
    pub fn peer(self) -> Side {
        match self {
            Side::Client => Side::Remote,
            Side::Remote => Side::Client,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Client => write!(f, "client"),
            Side::Remote => write!(f, "remote"),
        }
    }
}

/// Why an endpoint's stream stopped
#[derive(Debug)]
pub enum CloseReason {
    /// Orderly end of stream
    Eof,
    /// Read or write failure
    Error(io::Error),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Eof => write!(f, "No error"),
            CloseReason::Error(e) => write!(f, "{}", e),
        }
    }
}

/// Notifications from an endpoint's tasks to the owning session
#[derive(Debug)]
pub enum EndpointEvent {
    /// Bytes arrived on this side
    Data(Side, Bytes),
    /// This side's stream closed or failed
    Closed(Side, CloseReason),
    /// This side's outbound queue fell back to the low water mark
    Drained(Side),
}

/// Outcome of [`RelayEndpoint::write`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// Queued, below the high water mark
    Ready,
    /// Queued, but the outbound queue is above the high water mark
    Congested,
    /// Dropped because the endpoint is closing
    Closed,
}

/// Buffering and flow-control knobs
#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Size of each read from the stream
    pub read_buffer_size: usize,
    /// Queued bytes above which writes report [`WriteStatus::Congested`]
    pub high_water_mark: usize,
    /// Queued bytes at which a congested endpoint emits [`EndpointEvent::Drained`]
    pub low_water_mark: usize,
    /// Flush deadline after close
    pub close_linger: Duration,
}

impl Default for RelayOptions {
    fn default() -> Self {
        RelayOptions {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            low_water_mark: DEFAULT_LOW_WATER_MARK,
            close_linger: DEFAULT_CLOSE_LINGER,
        }
    }
}

/// Bytes queued for the writer task and whether congestion was reported
#[derive(Debug, Default)]
struct WriteGauge {
    pending: usize,
    congested: bool,
}

fn lock(gauge: &Mutex<WriteGauge>) -> MutexGuard<'_, WriteGauge> {
    gauge.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One live side of a relayed connection
#[derive(Debug)]
pub struct RelayEndpoint {
    side: Side,
    peer_addr: Option<SocketAddr>,
    local_addr: Option<SocketAddr>,
    closing: bool,
    paused: bool,
    pause_tx: watch::Sender<bool>,
    write_tx: Option<mpsc::UnboundedSender<Bytes>>,
    gauge: Arc<Mutex<WriteGauge>>,
    high_water_mark: usize,
    close_linger: Duration,
    reader: JoinHandle<()>,
    writer: Option<JoinHandle<()>>,
}

impl RelayEndpoint {
    /// Wrap `stream` and start reading immediately
    pub fn spawn<S, E>(side: Side, stream: S, events: mpsc::Sender<E>, opts: &RelayOptions) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
        E: From<EndpointEvent> + Send + 'static,
    {
        Self::start(side, stream, events, opts, false)
    }

    /// Wrap `stream` with reads paused until [`RelayEndpoint::resume_reads`]
    pub fn spawn_paused<S, E>(
        side: Side,
        stream: S,
        events: mpsc::Sender<E>,
        opts: &RelayOptions,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
        E: From<EndpointEvent> + Send + 'static,
    {
        Self::start(side, stream, events, opts, true)
    }

    fn start<S, E>(
        side: Side,
        stream: S,
        events: mpsc::Sender<E>,
        opts: &RelayOptions,
        paused: bool,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
        E: From<EndpointEvent> + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (pause_tx, pause_rx) = watch::channel(paused);
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let gauge = Arc::new(Mutex::new(WriteGauge::default()));

        let reader = tokio::spawn(
            read_loop(
                side,
                read_half,
                pause_rx,
                events.clone(),
                opts.read_buffer_size.max(1),
            )
            .instrument(Span::current()),
        );
        let writer = tokio::spawn(
            write_loop(
                side,
                write_half,
                write_rx,
                gauge.clone(),
                opts.low_water_mark,
                events,
            )
            .instrument(Span::current()),
        );

        RelayEndpoint {
            side,
            peer_addr: None,
            local_addr: None,
            closing: false,
            paused,
            pause_tx,
            write_tx: Some(write_tx),
            gauge,
            high_water_mark: opts.high_water_mark,
            close_linger: opts.close_linger,
            reader,
            writer: Some(writer),
        }
    }

    /// Record the address of the far end of the stream
    pub fn with_peer_addr(mut self, addr: Option<SocketAddr>) -> Self {
        self.peer_addr = addr;
        self
    }

    /// Record the local address of the stream
    pub fn with_local_addr(mut self, addr: Option<SocketAddr>) -> Self {
        self.local_addr = addr;
        self
    }

    /// Queue `data` for the writer task
    pub fn write(&mut self, data: Bytes) -> WriteStatus {
        let Some(write_tx) = self.write_tx.as_ref() else {
            trace!("Dropping {} bytes for closing {} endpoint", data.len(), self.side);
            return WriteStatus::Closed;
        };
        if data.is_empty() {
            return WriteStatus::Ready;
        }

        let len = data.len();
        let status = {
            let mut gauge = lock(&self.gauge);
            gauge.pending += len;
            if gauge.pending > self.high_water_mark {
                if !gauge.congested {
                    debug!("{} endpoint congested: {} bytes queued", self.side, gauge.pending);
                }
                gauge.congested = true;
                WriteStatus::Congested
            } else {
                WriteStatus::Ready
            }
        };

        if write_tx.send(data).is_err() {
            // Writer already failed; its Closed event is on the way
            lock(&self.gauge).pending -= len;
            return WriteStatus::Closed;
        }
        status
    }

    /// Stop delivering data from this endpoint
    pub fn pause_reads(&mut self) {
        if self.closing || self.paused {
            return;
        }
        debug!("Pause reading {} endpoint", self.side);
        self.paused = true;
        self.pause_tx.send_replace(true);
    }

    /// Resume delivering data from this endpoint
    pub fn resume_reads(&mut self) {
        if self.closing || !self.paused {
            return;
        }
        debug!("Resume reading {} endpoint", self.side);
        self.paused = false;
        self.pause_tx.send_replace(false);
    }

    /// Stop reading and shut the stream down once queued bytes are flushed.
    /// Closing twice is a no-op.
    pub fn close(&mut self, reason: &str) {
        if self.closing {
            return;
        }
        self.closing = true;
        debug!("Closing {} endpoint: {}", self.side, reason);

        self.reader.abort();
        self.write_tx = None;

        if let Some(mut writer) = self.writer.take() {
            let linger = self.close_linger;
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if tokio::time::timeout(linger, &mut writer).await.is_err() {
                            writer.abort();
                        }
                    });
                }
                Err(_) => writer.abort(),
            }
        }
    }

    /// Which side this endpoint serves
    pub fn side(&self) -> Side {
        self.side
    }

    /// Whether [`RelayEndpoint::close`] has been called
    pub fn is_closing(&self) -> bool {
        self.closing
    }

    /// Whether reads are paused
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Bytes queued but not yet written to the stream
    pub fn pending_bytes(&self) -> usize {
        lock(&self.gauge).pending
    }

    /// Address of the far end, if known
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Local address of the stream, if known
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

impl Drop for RelayEndpoint {
    fn drop(&mut self) {
        self.close("endpoint dropped");
    }
}

async fn read_loop<R, E>(
    side: Side,
    mut reader: R,
    mut pause_rx: watch::Receiver<bool>,
    events: mpsc::Sender<E>,
    buffer_size: usize,
) where
    R: AsyncRead + Unpin,
    E: From<EndpointEvent>,
{
    let mut buf = vec![0u8; buffer_size];
    loop {
        let paused = *pause_rx.borrow_and_update();
        if paused {
            if pause_rx.changed().await.is_err() {
                return;
            }
            continue;
        }

        // A pending read is abandoned when the pause flag flips; read() is
        // cancel safe so no bytes are lost.
        let result = tokio::select! {
            result = reader.read(&mut buf) => result,
            changed = pause_rx.changed() => {
                if changed.is_err() {
                    return;
                }
                continue;
            }
        };

        let event = match result {
            Ok(0) => EndpointEvent::Closed(side, CloseReason::Eof),
            Ok(n) => {
                trace!("Read {} bytes from {} endpoint", n, side);
                EndpointEvent::Data(side, Bytes::copy_from_slice(&buf[..n]))
            }
            Err(e) => EndpointEvent::Closed(side, CloseReason::Error(e)),
        };
        let done = matches!(event, EndpointEvent::Closed(..));

        if events.send(event.into()).await.is_err() || done {
            return;
        }
    }
}

async fn write_loop<W, E>(
    side: Side,
    mut writer: W,
    mut write_rx: mpsc::UnboundedReceiver<Bytes>,
    gauge: Arc<Mutex<WriteGauge>>,
    low_water_mark: usize,
    events: mpsc::Sender<E>,
) where
    W: AsyncWrite + Unpin,
    E: From<EndpointEvent>,
{
    while let Some(chunk) = write_rx.recv().await {
        if let Err(e) = writer.write_all(&chunk).await {
            debug!("Write to {} endpoint failed: {}", side, e);
            let _ = events
                .send(EndpointEvent::Closed(side, CloseReason::Error(e)).into())
                .await;
            return;
        }

        let drained = {
            let mut gauge = lock(&gauge);
            gauge.pending = gauge.pending.saturating_sub(chunk.len());
            if gauge.congested && gauge.pending <= low_water_mark {
                gauge.congested = false;
                true
            } else {
                false
            }
        };
        if drained {
            trace!("{} endpoint drained", side);
            let _ = events.send(EndpointEvent::Drained(side).into()).await;
        }
    }

    let _ = writer.shutdown().await;
}
