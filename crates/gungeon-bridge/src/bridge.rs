//! `Bridge`: the public lifecycle surface.
//!
//! A bridge owns one background thread running a
//! [`ConnectionManager`] on a current-thread Tokio runtime, plus the
//! handoff queue that thread fills. Consumer threads never touch the
//! socket; they only pull snapshots out of the queue.
//!
//! ```text
//! caller threads                       worker thread
//! ──────────────                       ─────────────
//! start() ─── spawn ─────────────────► ConnectionManager::run
//! latest_snapshot() ◄── HandoffQueue ◄─ decode / classify
//! close() ─── stop signal ───────────► exits, closes socket
//! ```

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use gungeon_protocol::{Handshake, Snapshot};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    BridgeConfig, BridgeError, BridgeMetrics, BridgeStats, ConnectionManager, ConnectionState,
    HandoffQueue,
};

/// Name given to the worker thread.
pub const WORKER_THREAD_NAME: &str = "gungeon-bridge-reader";

/// A running (or stopped) worker thread.
struct Worker {
    stop: watch::Sender<bool>,
    thread: JoinHandle<()>,
    /// Disconnects when the worker thread exits, which gives `close` a
    /// join with a timeout.
    done: mpsc::Receiver<()>,
}

/// Streams snapshots from the game plugin to any number of consumer threads.
///
/// ```rust,no_run
/// use std::time::Duration;
/// use gungeon_bridge::{Bridge, BridgeConfig};
///
/// let bridge = Bridge::new(BridgeConfig::default());
/// bridge.start()?;
///
/// while let Some(snapshot) = bridge.latest_snapshot(Some(Duration::from_secs(1))) {
///     println!("#{} hp={:?}", snapshot.sequence(), snapshot.player().get("health"));
/// }
///
/// bridge.close();
/// # Ok::<(), gungeon_bridge::BridgeError>(())
/// ```
pub struct Bridge {
    config: BridgeConfig,
    queue: Arc<HandoffQueue<Snapshot>>,
    stats: Arc<BridgeStats>,
    worker: Mutex<Option<Worker>>,
}

impl Bridge {
    /// Creates a bridge. Nothing connects until [`start`](Self::start).
    pub fn new(config: BridgeConfig) -> Self {
        let config = config.validated();
        Self {
            queue: Arc::new(HandoffQueue::new(config.queue_capacity)),
            stats: Arc::new(BridgeStats::default()),
            worker: Mutex::new(None),
            config,
        }
    }

    /// Starts the background worker.
    ///
    /// Idempotent: does nothing if the worker is already running. Safe to
    /// call again after [`close`](Self::close).
    ///
    /// # Errors
    /// Returns [`BridgeError::Runtime`] or [`BridgeError::Spawn`] if the
    /// worker's runtime or thread can't be created. Connection problems are
    /// never reported here; the worker retries them on its own.
    pub fn start(&self) -> Result<(), BridgeError> {
        let mut slot = self.lock_worker();
        if let Some(worker) = slot.as_ref() {
            if !worker.thread.is_finished() {
                debug!("bridge worker already running");
                return Ok(());
            }
        }
        if let Some(stale) = slot.take() {
            reap(stale.thread);
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(BridgeError::Runtime)?;

        // A fresh channel per start clears any stop request from the last run.
        let (stop_tx, stop_rx) = watch::channel(false);
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let manager = ConnectionManager::from_validated(
            self.config.clone(),
            Arc::clone(&self.queue),
            Arc::clone(&self.stats),
        );

        self.stats.set_state(ConnectionState::Disconnected);
        let thread = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                let _done = done_tx;
                runtime.block_on(manager.run(stop_rx));
            })
            .map_err(|e| {
                self.stats.set_state(ConnectionState::Stopped);
                BridgeError::Spawn(e)
            })?;

        *slot = Some(Worker {
            stop: stop_tx,
            thread,
            done: done_rx,
        });
        info!(addr = %self.config.addr(), "started bridge reader thread");
        Ok(())
    }

    /// Stops the worker and waits up to `join_timeout` for it to exit.
    ///
    /// The worker owns the socket and closes it as soon as it sees the stop
    /// signal. If it doesn't exit in time the thread is detached rather than
    /// waited on, and the socket stays open until the detached worker
    /// reaches its next checkpoint (at most one read timeout). Queued
    /// snapshots are kept and remain readable.
    pub fn close(&self) {
        let mut slot = self.lock_worker();
        let Some(worker) = slot.take() else {
            return;
        };

        worker.stop.send_replace(true);
        match worker.done.recv_timeout(self.config.join_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => reap(worker.thread),
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    timeout_ms = self.config.join_timeout.as_millis() as u64,
                    "bridge worker did not stop in time, detaching"
                );
            }
        }
        info!("bridge closed");
    }

    /// Removes and returns the oldest queued snapshot, waiting up to
    /// `timeout` for one to arrive.
    ///
    /// `None` or a zero timeout waits indefinitely. Returns `None` on
    /// timeout, which is a normal outcome: the bridge may not be started,
    /// the game may not be running, or it may simply be between ticks.
    pub fn latest_snapshot(&self, timeout: Option<Duration>) -> Option<Snapshot> {
        self.queue.pop(timeout)
    }

    /// Returns the oldest queued snapshot without waiting.
    pub fn try_latest_snapshot(&self) -> Option<Snapshot> {
        self.queue.try_pop()
    }

    /// Removes every queued snapshot, oldest first.
    pub fn drain_snapshots(&self) -> Vec<Snapshot> {
        self.queue.drain()
    }

    /// Whether the worker thread is alive.
    pub fn is_running(&self) -> bool {
        self.lock_worker()
            .as_ref()
            .is_some_and(|w| !w.thread.is_finished())
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.stats.state()
    }

    /// Handshake from the currently connected producer, if any.
    pub fn producer(&self) -> Option<Handshake> {
        self.stats.producer()
    }

    /// Point-in-time counters.
    pub fn metrics(&self) -> BridgeMetrics {
        self.stats.metrics(self.queue.dropped())
    }

    /// Number of snapshots waiting to be read.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// The validated configuration in use.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("addr", &self.config.addr())
            .field("state", &self.state())
            .field("queued", &self.queued())
            .finish()
    }
}

/// Joins a thread that has already exited, logging a panic if it had one.
fn reap(thread: JoinHandle<()>) {
    if thread.join().is_err() {
        warn!("bridge worker panicked");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn unreachable_config() -> BridgeConfig {
        // Port 1 on loopback: nothing listens there, connects fail fast.
        BridgeConfig::with_addr("127.0.0.1", 1).with_reconnect(crate::ReconnectPolicy::Fixed {
            delay: Duration::from_millis(20),
        })
    }

    #[test]
    fn test_latest_snapshot_without_start_times_out() {
        let bridge = Bridge::new(BridgeConfig::default());
        let start = Instant::now();
        assert!(bridge.latest_snapshot(Some(Duration::from_millis(50))).is_none());
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(bridge.state(), ConnectionState::Stopped);
        assert!(!bridge.is_running());
    }

    #[test]
    fn test_close_without_start_is_noop() {
        let bridge = Bridge::new(BridgeConfig::default());
        bridge.close();
        bridge.close();
        assert!(!bridge.is_running());
    }

    #[test]
    fn test_start_is_idempotent_and_close_stops_worker() {
        let bridge = Bridge::new(unreachable_config());
        bridge.start().unwrap();
        bridge.start().unwrap();
        assert!(bridge.is_running());

        // Let it fail a few connects.
        thread::sleep(Duration::from_millis(100));
        assert!(bridge.metrics().connect_attempts >= 1);

        let start = Instant::now();
        bridge.close();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(!bridge.is_running());
        assert_eq!(bridge.state(), ConnectionState::Stopped);
    }

    #[test]
    fn test_restart_after_close() {
        let bridge = Bridge::new(unreachable_config());
        bridge.start().unwrap();
        bridge.close();
        let attempts = bridge.metrics().connect_attempts;

        bridge.start().unwrap();
        assert!(bridge.is_running());
        thread::sleep(Duration::from_millis(100));
        assert!(bridge.metrics().connect_attempts > attempts);
        bridge.close();
    }

    #[test]
    fn test_config_is_validated() {
        let bridge = Bridge::new(BridgeConfig::default().with_queue_capacity(0));
        assert_eq!(bridge.config().queue_capacity, 1);
    }
}
