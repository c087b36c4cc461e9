//! The connection manager: connect, stream, tear down, retry.
//!
//! One [`ConnectionManager`] owns at most one socket at a time. Its
//! [`run`](ConnectionManager::run) loop is the whole background worker:
//!
//! ```text
//! loop until stopped:
//!   Connecting ── connect(timeout) ──► Streaming ── read(timeout) ──► decode ──► classify ──► queue
//!        │ fail                            │ EOF / timeout / I/O error
//!        ▼                                 ▼
//!   Disconnected ◄──── delay ◄──────── Error
//! ```
//!
//! Every failure here is transient: it's logged, the socket is dropped, and
//! the loop tries again after the configured delay. Nothing is surfaced to
//! consumers, who only ever see snapshots (or the lack of them).
//!
//! The stop signal is a `watch` channel. It's checked before every connect
//! attempt, read and retry delay, and every one of those awaits races
//! against it, so a stop request never waits out a full timeout.

use std::sync::Arc;

use gungeon_protocol::{FrameDecoder, Message, Snapshot};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, info, trace, warn};

use crate::{BridgeConfig, BridgeError, BridgeStats, ConnectionState, HandoffQueue};

/// Bytes requested per socket read.
const READ_CHUNK: usize = 4096;

/// Receiving half of the stop signal. Send `true` (or drop the sender) to
/// stop the worker.
pub type StopSignal = watch::Receiver<bool>;

/// Runs the connect/stream/retry loop for one producer address.
pub struct ConnectionManager {
    config: BridgeConfig,
    queue: Arc<HandoffQueue<Snapshot>>,
    stats: Arc<BridgeStats>,
}

impl ConnectionManager {
    /// Creates a manager that delivers snapshots into `queue`.
    pub fn new(
        config: BridgeConfig,
        queue: Arc<HandoffQueue<Snapshot>>,
        stats: Arc<BridgeStats>,
    ) -> Self {
        Self::from_validated(config.validated(), queue, stats)
    }

    /// Skips validation for a config the caller has already validated.
    pub(crate) fn from_validated(
        config: BridgeConfig,
        queue: Arc<HandoffQueue<Snapshot>>,
        stats: Arc<BridgeStats>,
    ) -> Self {
        Self {
            config,
            queue,
            stats,
        }
    }

    /// Runs until `stop` fires. Never returns an error: every failure is
    /// handled by reconnecting.
    ///
    /// The [`Bridge`](crate::Bridge) drives this on its own thread. Callers
    /// already inside a Tokio runtime can spawn it directly:
    ///
    /// ```rust,no_run
    /// # use std::sync::Arc;
    /// # use gungeon_bridge::{BridgeConfig, BridgeStats, ConnectionManager, HandoffQueue};
    /// # async fn demo() {
    /// let queue = Arc::new(HandoffQueue::new(128));
    /// let stats = Arc::new(BridgeStats::default());
    /// let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
    ///
    /// let manager = ConnectionManager::new(BridgeConfig::default(), Arc::clone(&queue), stats);
    /// let worker = tokio::spawn(manager.run(stop_rx));
    ///
    /// // ... consume from `queue` ...
    ///
    /// stop_tx.send_replace(true);
    /// worker.await.ok();
    /// # }
    /// ```
    pub async fn run(self, mut stop: StopSignal) {
        let addr = self.config.addr();
        let mut failures: u32 = 0;
        debug!(%addr, "connection manager started");

        while !is_stopped(&stop) {
            self.stats.set_state(ConnectionState::Connecting);
            self.stats.record_connect_attempt();
            info!(%addr, "connecting to producer");

            let connected = tokio::select! {
                res = self.connect(&addr) => res,
                _ = stop.changed() => break,
            };

            let error = match connected {
                Ok(stream) => {
                    failures = 0;
                    self.stats.record_connected();
                    self.stats.set_state(ConnectionState::Streaming);
                    info!(%addr, "connected to producer");

                    let result = self.stream(stream, &mut stop).await;
                    self.stats.set_producer(None);
                    match result {
                        Ok(()) => break,
                        Err(e) => {
                            self.stats.record_disconnect();
                            e
                        }
                    }
                }
                Err(e) => e,
            };

            self.stats.set_state(ConnectionState::Error);
            if failures == 0 {
                warn!(%addr, error = %error, "bridge reader error");
            } else {
                debug!(%addr, error = %error, failures, "bridge reader error");
            }
            self.stats.set_state(ConnectionState::Disconnected);

            if is_stopped(&stop) {
                break;
            }
            let delay = self.config.reconnect.delay(failures);
            failures = failures.saturating_add(1);
            debug!(delay_ms = delay.as_millis() as u64, "waiting before reconnect");
            tokio::select! {
                _ = time::sleep(delay) => {}
                _ = stop.changed() => {}
            }
        }

        self.stats.set_state(ConnectionState::Stopped);
        debug!(%addr, "connection manager stopped");
    }

    async fn connect(&self, addr: &str) -> Result<TcpStream, BridgeError> {
        let timeout = self.config.connect_timeout;
        match time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(BridgeError::Connect(e)),
            Err(_) => Err(BridgeError::ConnectTimeout(timeout)),
        }
    }

    /// Reads until the connection fails or `stop` fires. `Ok(())` means a
    /// stop was requested; any `Err` means reconnect.
    async fn stream(
        &self,
        mut stream: TcpStream,
        stop: &mut StopSignal,
    ) -> Result<(), BridgeError> {
        let read_timeout = self.config.read_timeout;
        let mut decoder = FrameDecoder::with_max_frame_len(self.config.max_frame_bytes);
        let mut buf = vec![0u8; READ_CHUNK];

        let result = loop {
            if is_stopped(stop) {
                break Ok(());
            }
            let read = tokio::select! {
                read = time::timeout(read_timeout, stream.read(&mut buf)) => read,
                _ = stop.changed() => break Ok(()),
            };
            let n = match read {
                Ok(Ok(0)) => break Err(BridgeError::ConnectionClosed),
                Ok(Ok(n)) => n,
                Ok(Err(e)) => break Err(BridgeError::Receive(e)),
                Err(_) => break Err(BridgeError::ReadTimeout(read_timeout)),
            };

            decoder.push(&buf[..n]);
            while let Some(frame) = decoder.next_frame() {
                match frame {
                    Ok(value) => self.dispatch(value),
                    Err(e) => {
                        self.stats.record_malformed();
                        debug!(error = %e, "dropping malformed message");
                    }
                }
            }
        };

        close_quietly(stream).await;
        result
    }

    /// Routes one decoded frame.
    fn dispatch(&self, value: Value) {
        match Message::classify(value) {
            Message::Handshake(handshake) => {
                info!(producer = %handshake, "connected to producer session");
                self.stats.record_handshake();
                self.stats.set_producer(Some(handshake));
            }
            Message::Snapshot(snapshot) => {
                trace!(sequence = snapshot.sequence(), "snapshot received");
                self.stats.record_snapshot();
                if let Some(evicted) = self.queue.push(snapshot) {
                    trace!(sequence = evicted.sequence(), "queue full, dropped oldest snapshot");
                }
            }
            Message::Unknown(kind) => {
                self.stats.record_ignored();
                debug!(kind = kind.as_deref().unwrap_or("<none>"), "ignoring message");
            }
        }
    }
}

/// Stop requested, or the controlling side went away.
fn is_stopped(stop: &StopSignal) -> bool {
    *stop.borrow() || stop.has_changed().is_err()
}

/// Best-effort socket teardown. Failures are logged, never propagated.
async fn close_quietly(mut stream: TcpStream) {
    if let Err(e) = stream.shutdown().await {
        debug!(error = %e, "socket shutdown failed");
    }
}
