//! Wire protocol for the Gungeon bridge.
//!
//! The game-side plugin streams newline-delimited JSON over TCP. This crate
//! turns that byte stream into typed values, and knows nothing about sockets
//! or threads:
//!
//! - **Framing** ([`FrameDecoder`]): bytes in, one JSON value per line out.
//! - **Classification** ([`Message`]): routes a value by its
//!   `message_type` field to a [`Handshake`] or a [`Snapshot`].
//! - **Snapshot model** ([`Snapshot`]): immutable game state with
//!   default-returning section accessors.
//! - **Recordings** ([`recording`]): the same snapshots, read back from
//!   the plugin's `.jsonl` capture files.
//!
//! ```text
//! TCP bytes → FrameDecoder (Value) → Message::classify → Snapshot
//! ```

mod error;
mod frame;
mod message;
pub mod recording;
mod snapshot;

pub use error::ProtocolError;
pub use frame::{DEFAULT_MAX_FRAME_BYTES, FrameDecoder, decode_frame};
pub use message::{HANDSHAKE_TYPE, Handshake, MESSAGE_TYPE_FIELD, Message, SNAPSHOT_TYPE};
pub use recording::{Marker, Record, RecordReader};
pub use snapshot::{NO_PLAYER_HEALTH, Snapshot};
