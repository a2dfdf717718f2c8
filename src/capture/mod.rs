//! Microphone capture and fixed-interval chunk emission.
//!
//! `ChunkCapture` owns at most one live `CaptureSession`: the cpal input
//! stream (kept on a dedicated thread — cpal streams are not `Send`), a
//! chunk task that drains one window per interval and encodes it, and a
//! meter task feeding the shared level gauge. Stopping tears down the
//! encoder, then the stream, then the meter, and drops the level to 0.

pub mod encoder;
pub mod ring_buffer;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::CaptureConstraints;
use crate::error::{Result, StreamError};
use crate::meter::{self, LevelHandle, WINDOW_SAMPLES};
use ring_buffer::{sample_buffer, SampleDrain, SampleProducer};

/// Cadence of the metering loop (roughly display-refresh rate).
const METER_INTERVAL: Duration = Duration::from_millis(16);

/// Receives each encoded chunk as it is emitted.
pub type ChunkSink = Arc<dyn Fn(Vec<u8>) + Send + Sync>;

pub struct ChunkCapture {
    interval: Duration,
    level: Arc<LevelHandle>,
    session: Option<CaptureSession>,
}

/// The live device/encoder/meter binding. Exactly one exists between
/// `start` and `stop`.
struct CaptureSession {
    id: Uuid,
    live: Arc<AtomicBool>,
    stop_tx: std::sync::mpsc::Sender<()>,
    stream_thread: Option<std::thread::JoinHandle<()>>,
    chunk_task: JoinHandle<()>,
    meter_task: JoinHandle<()>,
}

/// What the stream thread hands back once the device is open.
struct StreamOpen {
    chunks: SampleDrain,
    meter: SampleDrain,
    sample_rate: u32,
    channels: u16,
}

impl ChunkCapture {
    pub fn new(interval_ms: u64, level: Arc<LevelHandle>) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms.max(1)),
            level,
            session: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Open the microphone and begin emitting one encoded chunk per
    /// interval. Device-acquisition failures come back synchronously and
    /// leave no session behind.
    pub async fn start(&mut self, constraints: &CaptureConstraints, on_chunk: ChunkSink) -> Result<()> {
        if self.session.is_some() {
            return Err(StreamError::DeviceAcquisition(
                "capture session already active".into(),
            ));
        }

        let id = Uuid::new_v4();
        info!(
            session = %id,
            echo_cancellation = constraints.echo_cancellation,
            noise_suppression = constraints.noise_suppression,
            auto_gain_control = constraints.auto_gain_control,
            "Requesting capture device"
        );

        let (ready_tx, ready_rx) = oneshot::channel::<Result<StreamOpen>>();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
        let thread_constraints = constraints.clone();
        let interval = self.interval;
        let thread = std::thread::Builder::new()
            .name("mic-capture".into())
            .spawn(move || run_stream_thread(thread_constraints, interval, ready_tx, stop_rx))
            .map_err(|e| {
                StreamError::DeviceAcquisition(format!("capture thread spawn failed: {}", e))
            })?;

        let open = match ready_rx.await {
            Ok(Ok(open)) => open,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                return Err(StreamError::DeviceAcquisition(
                    "capture thread exited before the device opened".into(),
                ))
            }
        };

        let live = Arc::new(AtomicBool::new(true));
        let chunk_task = tokio::spawn(run_chunk_loop(
            open.chunks,
            open.sample_rate,
            open.channels,
            self.interval,
            Arc::clone(&live),
            on_chunk,
            id,
        ));
        let meter_task = tokio::spawn(run_meter_loop(
            open.meter,
            Arc::clone(&self.level),
            Arc::clone(&live),
        ));

        info!(
            session = %id,
            sample_rate = open.sample_rate,
            channels = open.channels,
            "Capture started"
        );
        self.session = Some(CaptureSession {
            id,
            live,
            stop_tx,
            stream_thread: Some(thread),
            chunk_task,
            meter_task,
        });
        Ok(())
    }

    /// Idempotent teardown. Cancels the pending chunk interval, releases
    /// the device, stops the meter, and resets the level to 0. A call
    /// with no active session is a no-op.
    pub fn stop(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        session.live.store(false, Ordering::SeqCst);
        session.chunk_task.abort();
        let _ = session.stop_tx.send(());
        if let Some(thread) = session.stream_thread.take() {
            if thread.join().is_err() {
                warn!(session = %session.id, "Capture thread panicked during teardown");
            }
        }
        session.meter_task.abort();
        self.level.reset();
        info!(session = %session.id, "Capture stopped");
    }
}

/// Keeps the cpal stream alive until told to stop. The stream must live
/// and die on this thread.
fn run_stream_thread(
    constraints: CaptureConstraints,
    interval: Duration,
    ready_tx: oneshot::Sender<Result<StreamOpen>>,
    stop_rx: std::sync::mpsc::Receiver<()>,
) {
    match open_stream(&constraints, interval) {
        Ok((stream, open)) => {
            if ready_tx.send(Ok(open)).is_err() {
                return; // caller gone; stream drops here
            }
            let _ = stop_rx.recv();
            drop(stream);
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
        }
    }
}

/// Resolve the input device and start the stream, wiring the callback to
/// the chunk and meter buffers.
fn open_stream(
    constraints: &CaptureConstraints,
    interval: Duration,
) -> Result<(cpal::Stream, StreamOpen)> {
    let host = cpal::default_host();

    let device = match &constraints.device {
        Some(name) => host
            .input_devices()
            .map_err(|e| {
                StreamError::DeviceAcquisition(format!("input device enumeration failed: {}", e))
            })?
            .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
            .ok_or_else(|| {
                StreamError::DeviceAcquisition(format!("input device not found: {}", name))
            })?,
        None => host.default_input_device().ok_or_else(|| {
            StreamError::DeviceAcquisition("no default input device available".into())
        })?,
    };
    let device_name = device.name().unwrap_or_else(|_| "unknown".into());

    let default_config = device.default_input_config().map_err(|e| {
        StreamError::DeviceAcquisition(format!(
            "no usable input config for {}: {}",
            device_name, e
        ))
    })?;
    let sample_rate = default_config.sample_rate().0;
    let channels = default_config.channels();
    let stream_config = StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    info!(device = %device_name, sample_rate, channels, "Selected input device");

    // Room for two chunk windows between drains.
    let capacity =
        (sample_rate as u64 * channels as u64 * interval.as_millis() as u64 * 2 / 1000) as usize;
    let (chunk_prod, chunk_drain) = sample_buffer(capacity.max(8192));
    let (meter_prod, meter_drain) = sample_buffer(WINDOW_SAMPLES * 32);

    let stream = build_stream(&device, &stream_config, chunk_prod, meter_prod)?;
    stream
        .play()
        .map_err(|e| StreamError::DeviceAcquisition(format!("input stream start failed: {}", e)))?;

    Ok((
        stream,
        StreamOpen {
            chunks: chunk_drain,
            meter: meter_drain,
            sample_rate,
            channels,
        },
    ))
}

fn build_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut chunk_prod: SampleProducer,
    mut meter_prod: SampleProducer,
) -> Result<cpal::Stream> {
    device
        .build_input_stream(
            config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                let written = chunk_prod.push(data);
                if written < data.len() {
                    // Chunk task fell behind; the tail of this callback
                    // is lost and the next drain catches up.
                }
                meter_prod.push(data);
            },
            move |err| {
                error!("Input stream error: {}", err);
            },
            None,
        )
        .map_err(|e| StreamError::DeviceAcquisition(format!("input stream build failed: {}", e)))
}

/// Emit one encoded chunk per interval until the session dies. An encode
/// failure drops that window and the next interval proceeds.
async fn run_chunk_loop(
    mut drain: SampleDrain,
    sample_rate: u32,
    channels: u16,
    interval: Duration,
    live: Arc<AtomicBool>,
    on_chunk: ChunkSink,
    session: Uuid,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await; // first tick completes immediately
    let mut pending: Vec<f32> = Vec::new();
    loop {
        ticker.tick().await;
        if !live.load(Ordering::SeqCst) {
            break;
        }
        pending.extend(drain.drain());
        // Only whole frames go into a chunk; a torn frame waits for the
        // next window.
        let whole = pending.len() - pending.len() % channels as usize;
        if whole == 0 {
            debug!(session = %session, "Empty capture window; skipping chunk");
            continue;
        }
        let window: Vec<f32> = pending.drain(..whole).collect();
        match encoder::encode_chunk(&window, sample_rate, channels) {
            Ok(bytes) => {
                debug!(session = %session, bytes = bytes.len(), "Chunk emitted");
                on_chunk(bytes);
            }
            Err(e) => warn!(session = %session, error = %e, "Chunk dropped"),
        }
    }
    debug!(session = %session, "Chunk loop finished");
}

/// Re-sample the level on a per-frame cadence. Liveness is checked every
/// pass so a torn-down stream is never sampled.
async fn run_meter_loop(mut drain: SampleDrain, level: Arc<LevelHandle>, live: Arc<AtomicBool>) {
    let mut ticker = tokio::time::interval(METER_INTERVAL);
    let mut window: Vec<f32> = Vec::with_capacity(WINDOW_SAMPLES);
    loop {
        ticker.tick().await;
        if !live.load(Ordering::SeqCst) {
            break;
        }
        let fresh = drain.drain();
        if !fresh.is_empty() {
            window.extend(fresh);
            if window.len() > WINDOW_SAMPLES {
                window.drain(..window.len() - WINDOW_SAMPLES);
            }
            level.set(meter::sample(&window));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    async fn drain_tasks() {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    fn tone(amplitude: f32) -> Vec<f32> {
        (0..WINDOW_SAMPLES)
            .map(|i| {
                let t = i as f32 / WINDOW_SAMPLES as f32;
                amplitude * (2.0 * std::f32::consts::PI * 8.0 * t).sin()
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn chunk_loop_emits_once_per_interval() {
        let (mut prod, drain) = sample_buffer(1 << 16);
        let live = Arc::new(AtomicBool::new(true));
        let emitted: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink: ChunkSink = {
            let emitted = Arc::clone(&emitted);
            Arc::new(move |chunk| emitted.lock().unwrap().push(chunk))
        };
        tokio::spawn(run_chunk_loop(
            drain,
            48_000,
            1,
            Duration::from_millis(2000),
            Arc::clone(&live),
            sink,
            Uuid::new_v4(),
        ));
        drain_tasks().await;

        prod.push(&[0.5f32; 960]);
        tokio::time::advance(Duration::from_millis(2000)).await;
        drain_tasks().await;
        {
            let chunks = emitted.lock().unwrap();
            assert_eq!(chunks.len(), 1);
            assert_eq!(&chunks[0][0..4], b"RIFF");
            assert_eq!(chunks[0].len(), 44 + 960 * 2);
        }

        // Nothing captured in this window: no chunk, capture continues.
        tokio::time::advance(Duration::from_millis(2000)).await;
        drain_tasks().await;
        assert_eq!(emitted.lock().unwrap().len(), 1);

        prod.push(&[0.1f32; 480]);
        tokio::time::advance(Duration::from_millis(2000)).await;
        drain_tasks().await;
        assert_eq!(emitted.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn chunk_loop_keeps_torn_frames_for_the_next_window() {
        let (mut prod, drain) = sample_buffer(1 << 16);
        let live = Arc::new(AtomicBool::new(true));
        let emitted: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink: ChunkSink = {
            let emitted = Arc::clone(&emitted);
            Arc::new(move |chunk| emitted.lock().unwrap().push(chunk))
        };
        tokio::spawn(run_chunk_loop(
            drain,
            48_000,
            2, // stereo: odd sample counts tear a frame
            Duration::from_millis(2000),
            Arc::clone(&live),
            sink,
            Uuid::new_v4(),
        ));
        drain_tasks().await;

        prod.push(&[0.2f32; 101]);
        tokio::time::advance(Duration::from_millis(2000)).await;
        drain_tasks().await;
        {
            let chunks = emitted.lock().unwrap();
            assert_eq!(chunks.len(), 1);
            // 100 samples encoded, 1 held back.
            assert_eq!(chunks[0].len(), 44 + 100 * 2);
        }

        prod.push(&[0.2f32; 1]);
        tokio::time::advance(Duration::from_millis(2000)).await;
        drain_tasks().await;
        let chunks = emitted.lock().unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].len(), 44 + 2 * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn no_chunk_fires_after_liveness_clears() {
        let (mut prod, drain) = sample_buffer(1 << 16);
        let live = Arc::new(AtomicBool::new(true));
        let emitted: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink: ChunkSink = {
            let emitted = Arc::clone(&emitted);
            Arc::new(move |chunk| emitted.lock().unwrap().push(chunk))
        };
        tokio::spawn(run_chunk_loop(
            drain,
            48_000,
            1,
            Duration::from_millis(2000),
            Arc::clone(&live),
            sink,
            Uuid::new_v4(),
        ));
        drain_tasks().await;

        prod.push(&[0.5f32; 480]);
        tokio::time::advance(Duration::from_millis(2000)).await;
        drain_tasks().await;
        assert_eq!(emitted.lock().unwrap().len(), 1);

        live.store(false, Ordering::SeqCst);
        prod.push(&[0.5f32; 4800]);
        for _ in 0..4 {
            tokio::time::advance(Duration::from_millis(2000)).await;
            drain_tasks().await;
        }
        assert_eq!(emitted.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn meter_loop_tracks_level_until_liveness_clears() {
        let (mut prod, drain) = sample_buffer(8192);
        let live = Arc::new(AtomicBool::new(true));
        let level = LevelHandle::new();
        tokio::spawn(run_meter_loop(drain, Arc::clone(&level), Arc::clone(&live)));
        drain_tasks().await;

        prod.push(&tone(0.8));
        tokio::time::advance(METER_INTERVAL).await;
        drain_tasks().await;
        assert!(level.get() > 0);

        live.store(false, Ordering::SeqCst);
        let frozen = level.get();
        prod.push(&vec![0.0f32; WINDOW_SAMPLES]);
        for _ in 0..10 {
            tokio::time::advance(METER_INTERVAL).await;
            drain_tasks().await;
        }
        // No sample lands after stop; the gauge reset happens in stop().
        assert_eq!(level.get(), frozen);
    }

    #[tokio::test]
    async fn stop_without_a_session_is_a_no_op() {
        let level = LevelHandle::new();
        let mut capture = ChunkCapture::new(2000, Arc::clone(&level));
        assert!(!capture.is_active());
        capture.stop();
        capture.stop();
        assert!(!capture.is_active());
        assert_eq!(level.get(), 0);
    }
}
