//! WebSocket transport client.
//!
//! Owns one duplex connection to the streaming endpoint. Outbound chunks
//! go out as binary frames; inbound frames are classified as control
//! (structured text) or audio and handed to the caller's handler set. An
//! established connection that drops without a caller `disconnect` is
//! re-dialed on a fixed delay, a bounded number of times.
//!
//! The concrete socket sits behind the `Connector` seam so the state
//! machine and retry logic run against an in-memory wire in tests.

pub mod frame;
pub mod state;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, StreamError};
use frame::{classify_text, ControlFrame, Inbound};
use state::{ConnectionGauge, ConnectionState};

/// Outbound wire frames.
#[derive(Debug, Clone, PartialEq)]
pub enum WireFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// Events delivered by a live connection's read side.
#[derive(Debug)]
pub enum WireEvent {
    Frame(WireFrame),
    /// The connection errored; the channel closes once drained.
    Error(StreamError),
}

/// A live duplex connection. Dropping `tx` closes the connection;
/// `rx` ending means the connection is gone.
pub struct WireConnection {
    pub tx: mpsc::UnboundedSender<WireFrame>,
    pub rx: mpsc::UnboundedReceiver<WireEvent>,
}

/// Dials the streaming endpoint.
pub trait Connector: Send + Sync {
    fn connect<'a>(
        &'a self,
        endpoint: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<WireConnection>> + Send + 'a>>;
}

/// Caller-supplied handler set, invoked by the connection's reader in
/// network arrival order. The same set is reused across reconnect
/// attempts.
pub struct TransportHandlers {
    pub on_open: Box<dyn Fn() + Send + Sync>,
    pub on_control: Box<dyn Fn(ControlFrame) + Send + Sync>,
    pub on_audio: Box<dyn Fn(Vec<u8>) + Send + Sync>,
    pub on_close: Box<dyn Fn() + Send + Sync>,
    /// Called with the attempt number just before each reconnect dial.
    pub on_reconnect: Box<dyn Fn(u32) + Send + Sync>,
}

impl TransportHandlers {
    /// A handler set that ignores everything. Override the fields you need.
    pub fn noop() -> Self {
        Self {
            on_open: Box::new(|| {}),
            on_control: Box::new(|_| {}),
            on_audio: Box::new(|_| {}),
            on_close: Box::new(|| {}),
            on_reconnect: Box::new(|_| {}),
        }
    }
}

pub struct TransportClient {
    connector: Arc<dyn Connector>,
    state: Arc<ConnectionGauge>,
    retry_delay: Duration,
    retry_budget: u32,
    retries: AtomicU32,
    /// Set by `disconnect` before closing, so the close path can tell a
    /// caller-requested close from a network drop.
    user_closed: AtomicBool,
    /// Bumped on every dial and on `disconnect`; a reader whose epoch is
    /// stale must not mutate state or schedule retries.
    epoch: AtomicU64,
    outbound: Mutex<Option<mpsc::UnboundedSender<WireFrame>>>,
    pending_retry: Mutex<Option<JoinHandle<()>>>,
}

impl TransportClient {
    pub fn new(connector: Arc<dyn Connector>, retry_delay: Duration, retry_budget: u32) -> Arc<Self> {
        Arc::new(Self {
            connector,
            state: ConnectionGauge::new(),
            retry_delay,
            retry_budget,
            retries: AtomicU32::new(0),
            user_closed: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            outbound: Mutex::new(None),
            pending_retry: Mutex::new(None),
        })
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Establish the connection. A handshake failure leaves the client in
    /// `Error` state and is returned to the caller; automatic retry only
    /// follows an established-then-dropped connection.
    pub async fn connect(
        self: &Arc<Self>,
        endpoint: &str,
        handlers: Arc<TransportHandlers>,
    ) -> Result<()> {
        self.user_closed.store(false, Ordering::SeqCst);
        if let Some(handle) = self.pending_retry.lock().unwrap().take() {
            handle.abort();
        }
        match self.open(endpoint, handlers).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.state.set(ConnectionState::Error);
                Err(e)
            }
        }
    }

    /// Dial and, on success, install the connection and spawn its reader.
    async fn open(self: &Arc<Self>, endpoint: &str, handlers: Arc<TransportHandlers>) -> Result<()> {
        validate_endpoint(endpoint)?;
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.set(ConnectionState::Connecting);
        let WireConnection { tx, rx } = self.connector.connect(endpoint).await?;
        *self.outbound.lock().unwrap() = Some(tx);
        self.retries.store(0, Ordering::SeqCst);
        self.state.set(ConnectionState::Connected);
        info!(endpoint = %endpoint, "Transport connected");
        (handlers.on_open)();
        tokio::spawn(Arc::clone(self).read_loop(rx, endpoint.to_string(), handlers, epoch));
        Ok(())
    }

    /// Drain one connection's inbound side, then run the close path.
    async fn read_loop(
        self: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<WireEvent>,
        endpoint: String,
        handlers: Arc<TransportHandlers>,
        epoch: u64,
    ) {
        while let Some(event) = rx.recv().await {
            match event {
                WireEvent::Frame(WireFrame::Text(text)) => match classify_text(&text) {
                    Inbound::Control(ctrl) => (handlers.on_control)(ctrl),
                    Inbound::Audio(bytes) => (handlers.on_audio)(bytes),
                },
                WireEvent::Frame(WireFrame::Binary(bytes)) => (handlers.on_audio)(bytes),
                WireEvent::Error(e) => {
                    warn!(error = %e, "Connection error");
                    if self.epoch.load(Ordering::SeqCst) == epoch {
                        self.state.set(ConnectionState::Error);
                    }
                }
            }
        }

        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!("Stale connection reader exiting");
            return;
        }

        self.outbound.lock().unwrap().take();
        self.state.set(ConnectionState::Disconnected);
        (handlers.on_close)();

        if !self.user_closed.load(Ordering::SeqCst) {
            self.schedule_retry(endpoint, handlers);
        }
    }

    /// Queue one reconnect attempt after the fixed delay, if budget remains.
    fn schedule_retry(self: &Arc<Self>, endpoint: String, handlers: Arc<TransportHandlers>) {
        let attempt = self.retries.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt > self.retry_budget {
            info!(
                attempts = self.retry_budget,
                "Reconnect budget exhausted; staying disconnected"
            );
            return;
        }

        let client = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(client.retry_delay).await;
            if client.user_closed.load(Ordering::SeqCst) {
                return;
            }
            (handlers.on_reconnect)(attempt);
            info!(attempt, endpoint = %endpoint, "Reconnecting");
            match client.open(&endpoint, Arc::clone(&handlers)).await {
                Ok(()) => {}
                Err(e) => {
                    warn!(attempt, error = %e, "Reconnect attempt failed");
                    client.state.set(ConnectionState::Disconnected);
                    client.schedule_retry(endpoint, handlers);
                }
            }
        });
        *self.pending_retry.lock().unwrap() = Some(handle);
    }

    /// Transmit one chunk if and only if the connection is open. Nothing
    /// is ever buffered: a chunk offered while not Connected is dropped
    /// and `false` returned.
    pub fn send(&self, chunk: &[u8]) -> bool {
        if self.state.get() != ConnectionState::Connected {
            return false;
        }
        match self.outbound.lock().unwrap().as_ref() {
            Some(tx) => tx.send(WireFrame::Binary(chunk.to_vec())).is_ok(),
            None => false,
        }
    }

    /// Close deterministically and suppress any pending reconnect.
    pub fn disconnect(&self) {
        self.user_closed.store(true, Ordering::SeqCst);
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.pending_retry.lock().unwrap().take() {
            handle.abort();
        }
        self.outbound.lock().unwrap().take();
        self.state.set(ConnectionState::Disconnected);
        info!("Transport disconnected");
    }
}

fn validate_endpoint(endpoint: &str) -> Result<()> {
    let uri: http::Uri = endpoint
        .parse()
        .map_err(|e| StreamError::Handshake(format!("invalid endpoint {:?}: {}", endpoint, e)))?;
    match uri.scheme_str() {
        Some("ws") | Some("wss") => Ok(()),
        other => Err(StreamError::Handshake(format!(
            "unsupported scheme {:?} in {:?}",
            other.unwrap_or(""),
            endpoint
        ))),
    }
}

// ---------------------------------------------------------------------------
// tokio-tungstenite connector
// ---------------------------------------------------------------------------

/// Production connector: dials with tokio-tungstenite and pumps the split
/// socket halves through the wire channels.
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect<'a>(
        &'a self,
        endpoint: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<WireConnection>> + Send + 'a>> {
        Box::pin(async move {
            let id = Uuid::new_v4();
            let (socket, response) = connect_async(endpoint)
                .await
                .map_err(|e| StreamError::Handshake(e.to_string()))?;
            debug!(connection = %id, status = %response.status(), "WebSocket open");
            let (mut sink, mut stream) = socket.split();

            let (out_tx, mut out_rx) = mpsc::unbounded_channel::<WireFrame>();
            let (in_tx, in_rx) = mpsc::unbounded_channel::<WireEvent>();

            // Writer pump: owns the sink; a dropped sender closes the socket.
            tokio::spawn(async move {
                while let Some(frame) = out_rx.recv().await {
                    let msg = match frame {
                        WireFrame::Text(text) => Message::Text(text),
                        WireFrame::Binary(bytes) => Message::Binary(bytes),
                    };
                    if let Err(e) = sink.send(msg).await {
                        debug!(connection = %id, error = %e, "WebSocket write failed");
                        break;
                    }
                }
                let _ = sink.send(Message::Close(None)).await;
                debug!(connection = %id, "Writer pump finished");
            });

            // Reader pump: forwards inbound frames in arrival order. The
            // channel closing is the close event.
            tokio::spawn(async move {
                while let Some(item) = stream.next().await {
                    match item {
                        Ok(Message::Text(text)) => {
                            if in_tx.send(WireEvent::Frame(WireFrame::Text(text))).is_err() {
                                break;
                            }
                        }
                        Ok(Message::Binary(bytes)) => {
                            if in_tx
                                .send(WireEvent::Frame(WireFrame::Binary(bytes)))
                                .is_err()
                            {
                                break;
                            }
                        }
                        Ok(Message::Close(_)) => break,
                        // tungstenite answers pings on flush; nothing to do.
                        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                        Err(e) => {
                            let _ = in_tx.send(WireEvent::Error(StreamError::ConnectionDropped(
                                e.to_string(),
                            )));
                            break;
                        }
                    }
                }
                debug!(connection = %id, "Reader pump finished");
            });

            Ok(WireConnection {
                tx: out_tx,
                rx: in_rx,
            })
        })
    }
}
