use std::time::Duration;

use gungeon_protocol::ProtocolError;

/// Errors that can occur in the bridge.
///
/// Most of these never reach the caller. Connection failures are returned
/// inside the background worker, logged, and answered with a reconnect.
/// Only [`Runtime`](Self::Runtime) and [`Spawn`](Self::Spawn) can come out
/// of [`Bridge::start`](crate::Bridge::start).
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The producer didn't accept the connection in time.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// The connection attempt failed (refused, unreachable, bad address).
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    /// No bytes arrived within the read timeout.
    #[error("no data received for {0:?}")]
    ReadTimeout(Duration),

    /// Reading from the socket failed.
    #[error("receive failed: {0}")]
    Receive(#[source] std::io::Error),

    /// The producer closed the connection.
    #[error("connection closed by remote host")]
    ConnectionClosed,

    /// The worker's async runtime could not be built.
    #[error("failed to build worker runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// The worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// A frame or recording could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl BridgeError {
    /// Whether the worker recovers from this error by reconnecting.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectTimeout(_)
                | Self::Connect(_)
                | Self::ReadTimeout(_)
                | Self::Receive(_)
                | Self::ConnectionClosed
        )
    }
}
