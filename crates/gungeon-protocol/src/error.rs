//! Error types for the protocol layer.
//!
//! Every variant here describes a problem with a single frame or a single
//! recorded line. None of them are fatal to a stream: the bridge logs the
//! error, drops the offending frame and keeps reading.

/// Errors that can occur while decoding frames or reading recordings.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The frame was not valid UTF-8 text.
    #[error("frame is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// The frame was valid text but not valid JSON.
    ///
    /// Common causes: a truncated line, a producer that crashed mid-write,
    /// or stray log output on the socket.
    #[error("decode failed: {0}")]
    Decode(#[from] serde_json::Error),

    /// A frame grew past the configured size cap before its newline
    /// arrived. The bytes up to the next newline are discarded.
    #[error("frame exceeds {limit} bytes")]
    FrameTooLarge {
        /// The configured cap, in bytes.
        limit: usize,
    },

    /// Reading a recorded run from disk failed.
    #[error("recording I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
