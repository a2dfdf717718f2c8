//! Audio streaming core.
//!
//! Communicates with the embedding UI process via JSON-line IPC on
//! stdin/stdout. This is the entry point that wires the orchestrator to
//! the IPC surface and runs the main event loop.

mod capture;
mod config;
mod error;
mod ipc;
mod meter;
mod orchestrator;
mod playback;
mod transport;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ipc::bridge::{emit_error, emit_event, spawn_stdin_reader};
use ipc::{StreamCommand, StreamEvent};
use orchestrator::{CoreEvent, StreamOrchestrator};
use playback::RodioPlayer;
use transport::frame::ControlFrame;
use transport::WsConnector;

/// Cadence for pushing level and playback observations to the UI.
const STATUS_TICK: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() {
    // Initialize tracing (respects RUST_LOG env, defaults to info).
    // stderr only — stdout carries the IPC protocol.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    emit_event(&StreamEvent::Starting {});

    let config = config::load();
    info!(?config, "Configuration loaded");

    let mut cmd_rx = spawn_stdin_reader();
    let (mut core, mut core_rx) = StreamOrchestrator::new(
        &config,
        Arc::new(WsConnector),
        Arc::new(RodioPlayer::new()),
    );

    emit_event(&StreamEvent::Ready {});
    info!("Streaming core ready");

    let mut ticker = tokio::time::interval(STATUS_TICK);
    let mut was_playing = false;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(command) => {
                    if !handle_command(command, &mut core, &config).await {
                        break;
                    }
                }
                None => {
                    // stdin closed — parent process gone.
                    info!("stdin closed, shutting down");
                    break;
                }
            },
            event = core_rx.recv() => {
                if let Some(event) = event {
                    emit_core_event(event);
                }
            }
            _ = ticker.tick() => {
                if core.capture_active() {
                    emit_event(&StreamEvent::Level { value: core.level() });
                }
                let playing = core.playback_active();
                if playing != was_playing {
                    if playing {
                        emit_event(&StreamEvent::PlaybackStart {});
                    } else {
                        emit_event(&StreamEvent::PlaybackEnd {});
                    }
                    was_playing = playing;
                }
            }
        }
    }

    core.shutdown();
    info!("Streaming core shutting down");
}

/// Handle a single command from the UI.
/// Returns `false` if the main loop should exit.
async fn handle_command(
    cmd: StreamCommand,
    core: &mut StreamOrchestrator,
    config: &config::StreamConfig,
) -> bool {
    match cmd {
        StreamCommand::Connect { url } => {
            let endpoint = url.unwrap_or_else(|| config.server_url.clone());
            if let Err(e) = core.connect(&endpoint).await {
                warn!(error = %e, endpoint = %endpoint, "Connect failed");
                emit_event(&StreamEvent::ConnectionError {
                    message: e.to_string(),
                });
            }
        }

        StreamCommand::Disconnect {} => {
            // Full teardown, same order as session shutdown: capture,
            // queue, socket.
            core.shutdown();
            emit_event(&StreamEvent::Disconnected {});
        }

        StreamCommand::StartRecording {} => match core.start_capture(&config.capture).await {
            Ok(()) => emit_event(&StreamEvent::RecordingStart {}),
            Err(e) => {
                warn!(error = %e, "Capture failed to start");
                emit_error(&e.to_string());
            }
        },

        StreamCommand::StopRecording {} => {
            core.stop_capture();
            emit_event(&StreamEvent::RecordingStop {});
        }

        StreamCommand::Status {} => {
            emit_event(&StreamEvent::Status {
                connection: core.connection_state().to_string(),
                recording: core.capture_active(),
                playing: core.playback_active(),
                level: core.level(),
            });
        }

        StreamCommand::Ping {} => {
            emit_event(&StreamEvent::Pong {});
        }

        StreamCommand::Stop {} => {
            emit_event(&StreamEvent::Stopping {});
            return false;
        }
    }

    true
}

fn emit_core_event(event: CoreEvent) {
    match event {
        CoreEvent::Opened => emit_event(&StreamEvent::Connected {}),
        CoreEvent::Closed => emit_event(&StreamEvent::Disconnected {}),
        CoreEvent::Reconnecting { attempt } => {
            emit_event(&StreamEvent::Reconnecting { attempt })
        }
        CoreEvent::Control(ControlFrame::Caption { text }) => {
            emit_event(&StreamEvent::Caption { text })
        }
        CoreEvent::Control(ControlFrame::Error { message }) => {
            emit_event(&StreamEvent::ServerError { message })
        }
        CoreEvent::Control(ControlFrame::Other(payload)) => {
            emit_event(&StreamEvent::Control { payload })
        }
    }
}
