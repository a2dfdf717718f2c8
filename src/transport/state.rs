//! Connection state machine.
//!
//! Lock-free state cell shared between the transport's internal event
//! handlers (the only writers) and external observers.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Transport connection states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// No connection, and no dial in progress.
    Disconnected = 0,
    /// A dial is in progress (initial connect or reconnect attempt).
    Connecting = 1,
    /// The connection is open; `send` transmits.
    Connected = 2,
    /// The last dial or the live connection failed.
    Error = 3,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Error,
            _ => Self::Disconnected,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Shared connection state, readable from any thread.
#[derive(Debug)]
pub struct ConnectionGauge(AtomicU8);

impl ConnectionGauge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self(AtomicU8::new(ConnectionState::Disconnected as u8)))
    }

    /// Current state.
    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::Release);
    }
}
