//! Composition root: wires capture output into the transport, inbound
//! frames into playback and the event channel, and owns teardown order.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::capture::{ChunkCapture, ChunkSink};
use crate::config::{CaptureConstraints, StreamConfig};
use crate::error::Result;
use crate::meter::LevelHandle;
use crate::playback::{ChunkPlayer, PlaybackQueue};
use crate::transport::frame::ControlFrame;
use crate::transport::state::ConnectionState;
use crate::transport::{Connector, TransportClient, TransportHandlers};

/// Connection edges and control frames, for the embedding layer.
#[derive(Debug)]
pub enum CoreEvent {
    Opened,
    Closed,
    Reconnecting { attempt: u32 },
    Control(ControlFrame),
}

pub struct StreamOrchestrator {
    transport: Arc<TransportClient>,
    capture: ChunkCapture,
    playback: Arc<PlaybackQueue>,
    level: Arc<LevelHandle>,
    events: mpsc::UnboundedSender<CoreEvent>,
}

impl StreamOrchestrator {
    pub fn new(
        config: &StreamConfig,
        connector: Arc<dyn Connector>,
        player: Arc<dyn ChunkPlayer>,
    ) -> (Self, mpsc::UnboundedReceiver<CoreEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let level = LevelHandle::new();
        let transport = TransportClient::new(
            connector,
            Duration::from_millis(config.reconnect_delay_ms),
            config.max_reconnect_attempts,
        );
        let capture = ChunkCapture::new(config.chunk_interval_ms, Arc::clone(&level));
        let playback = PlaybackQueue::new(player);
        (
            Self {
                transport,
                capture,
                playback,
                level,
                events,
            },
            events_rx,
        )
    }

    /// Connect the transport. Inbound binary frames feed the playback
    /// queue; control frames and connection edges go to the event channel
    /// untouched.
    pub async fn connect(&self, endpoint: &str) -> Result<()> {
        let handlers = Arc::new(self.build_handlers());
        self.transport.connect(endpoint, handlers).await
    }

    fn build_handlers(&self) -> TransportHandlers {
        let playback = Arc::clone(&self.playback);
        let on_open = self.events.clone();
        let on_control = self.events.clone();
        let on_close = self.events.clone();
        let on_reconnect = self.events.clone();
        TransportHandlers {
            on_open: Box::new(move || {
                let _ = on_open.send(CoreEvent::Opened);
            }),
            on_control: Box::new(move |frame| {
                let _ = on_control.send(CoreEvent::Control(frame));
            }),
            on_audio: Box::new(move |bytes| {
                debug!(bytes = bytes.len(), "Inbound audio chunk queued");
                playback.enqueue(bytes);
            }),
            on_close: Box::new(move || {
                let _ = on_close.send(CoreEvent::Closed);
            }),
            on_reconnect: Box::new(move |attempt| {
                let _ = on_reconnect.send(CoreEvent::Reconnecting { attempt });
            }),
        }
    }

    /// Start the microphone. Emitted chunks are sent while the transport
    /// is Connected and dropped otherwise; nothing is ever buffered for
    /// later.
    pub async fn start_capture(&mut self, constraints: &CaptureConstraints) -> Result<()> {
        let sink = chunk_forwarder(Arc::clone(&self.transport));
        self.capture.start(constraints, sink).await
    }

    pub fn stop_capture(&mut self) {
        self.capture.stop();
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.transport.state()
    }

    pub fn level(&self) -> u8 {
        self.level.get()
    }

    pub fn playback_active(&self) -> bool {
        self.playback.is_playing()
    }

    pub fn capture_active(&self) -> bool {
        self.capture.is_active()
    }

    /// Full teardown: capture first, then the queue, then the socket, so
    /// no device or socket handle outlives the session.
    pub fn shutdown(&mut self) {
        self.capture.stop();
        self.playback.clear();
        self.transport.disconnect();
        info!("Streaming session torn down");
    }
}

/// Forward each captured chunk into the transport, gated on Connected.
fn chunk_forwarder(transport: Arc<TransportClient>) -> ChunkSink {
    Arc::new(move |chunk: Vec<u8>| {
        if transport.state() == ConnectionState::Connected {
            if !transport.send(&chunk) {
                debug!(bytes = chunk.len(), "Chunk dropped: transport refused the write");
            }
        } else {
            debug!(bytes = chunk.len(), "Chunk dropped: not connected");
        }
    })
}
