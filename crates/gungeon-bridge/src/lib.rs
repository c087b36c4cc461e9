//! # Gungeon bridge
//!
//! Streams game-state snapshots from the Enter the Gungeon instrumentation
//! plugin to consumer code (visualizers, learning loops) with bounded memory
//! and automatic reconnection.
//!
//! The plugin listens on a local TCP port and writes one JSON object per
//! line. The bridge connects to it from a background thread, decodes and
//! classifies each line (see [`gungeon_protocol`]), and hands snapshots to
//! consumers through a drop-oldest queue so a slow consumer can never stall
//! the network side.
//!
//! ```text
//! game plugin ──TCP──► ConnectionManager ──► HandoffQueue ──► Bridge::latest_snapshot
//!                       (worker thread)       (drop-oldest)     (any thread)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use gungeon_bridge::prelude::*;
//!
//! let bridge = Bridge::new(BridgeConfig::default());
//! bridge.start()?;
//! if let Some(snapshot) = bridge.latest_snapshot(Some(Duration::from_secs(2))) {
//!     let enemies = snapshot.enemies().len();
//!     println!("tick {} with {enemies} enemies", snapshot.sequence());
//! }
//! bridge.close();
//! # Ok::<(), BridgeError>(())
//! ```

mod bridge;
mod config;
mod connection;
mod error;
mod queue;
mod stats;

pub use bridge::{Bridge, WORKER_THREAD_NAME};
pub use config::{BridgeConfig, DEFAULT_PORT, ReconnectPolicy};
pub use connection::{ConnectionManager, StopSignal};
pub use error::BridgeError;
pub use queue::HandoffQueue;
pub use stats::{BridgeMetrics, BridgeStats, ConnectionState};

pub use gungeon_protocol as protocol;

/// Re-exports everything a consumer needs.
pub mod prelude {
    pub use crate::{
        Bridge, BridgeConfig, BridgeError, BridgeMetrics, ConnectionState, ReconnectPolicy,
    };
    pub use gungeon_protocol::{Handshake, Snapshot};
}
