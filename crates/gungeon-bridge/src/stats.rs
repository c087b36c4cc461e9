//! Connection state and diagnostic counters.
//!
//! The worker updates the counters with relaxed atomics and the facade
//! reads them without locking. Only the producer handshake sits behind a
//! mutex. Counters are monotonic for the lifetime of the
//! [`Bridge`](crate::Bridge), across restarts.

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use gungeon_protocol::Handshake;

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// Where the connection manager is in its lifecycle.
///
/// ```text
/// Disconnected → Connecting → Streaming ─┐
///      ↑              │                  │ (remote close, timeout, I/O error)
///      │              ▼ (failure)        ▼
///      └──────── (delay) ◄────────── Error
///
/// any state ── stop ──► Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket held.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Connected and reading frames.
    Streaming,
    /// The connection just failed; a retry is pending.
    Error,
    /// The worker has exited.
    Stopped,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Connecting,
            2 => Self::Streaming,
            3 => Self::Error,
            4 => Self::Stopped,
            _ => Self::Disconnected,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Streaming => 2,
            Self::Error => 3,
            Self::Stopped => 4,
        }
    }

    /// Returns `true` while a socket is open.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Streaming)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Streaming => write!(f, "Streaming"),
            Self::Error => write!(f, "Error"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// Live counters shared between the worker and the facade.
#[derive(Debug)]
pub struct BridgeStats {
    state: AtomicU8,
    connect_attempts: AtomicU64,
    connections: AtomicU64,
    disconnects: AtomicU64,
    handshakes: AtomicU64,
    snapshots: AtomicU64,
    malformed_frames: AtomicU64,
    ignored_messages: AtomicU64,
    /// Identity of the producer on the current connection.
    producer: Mutex<Option<Handshake>>,
}

impl Default for BridgeStats {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Stopped.as_u8()),
            connect_attempts: AtomicU64::new(0),
            connections: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
            handshakes: AtomicU64::new(0),
            snapshots: AtomicU64::new(0),
            malformed_frames: AtomicU64::new(0),
            ignored_messages: AtomicU64::new(0),
            producer: Mutex::new(None),
        }
    }
}

impl BridgeStats {
    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub(crate) fn record_connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_connected(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_handshake(&self) {
        self.handshakes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_snapshot(&self) {
        self.snapshots.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_ignored(&self) {
        self.ignored_messages.fetch_add(1, Ordering::Relaxed);
    }

    /// Handshake received on the current connection, if any.
    pub fn producer(&self) -> Option<Handshake> {
        self.producer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_producer(&self, handshake: Option<Handshake>) {
        *self.producer.lock().unwrap_or_else(PoisonError::into_inner) = handshake;
    }

    /// Copies the counters into a plain value. `dropped` comes from the
    /// queue, which owns eviction.
    pub fn metrics(&self, dropped: u64) -> BridgeMetrics {
        BridgeMetrics {
            state: self.state(),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connections: self.connections.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            handshakes: self.handshakes.load(Ordering::Relaxed),
            snapshots: self.snapshots.load(Ordering::Relaxed),
            dropped,
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            ignored_messages: self.ignored_messages.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the bridge counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeMetrics {
    /// Connection state when the copy was taken.
    pub state: ConnectionState,
    /// Connection attempts started.
    pub connect_attempts: u64,
    /// Attempts that succeeded.
    pub connections: u64,
    /// Established connections that were lost (not counting shutdown).
    pub disconnects: u64,
    /// Handshakes received.
    pub handshakes: u64,
    /// Snapshots handed to the queue.
    pub snapshots: u64,
    /// Snapshots evicted unread because the queue was full.
    pub dropped: u64,
    /// Frames dropped for bad UTF-8, bad JSON or excessive size.
    pub malformed_frames: u64,
    /// Well-formed messages with an unknown or missing `message_type`.
    pub ignored_messages: u64,
}
