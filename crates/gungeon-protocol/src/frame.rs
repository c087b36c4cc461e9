//! Newline-delimited JSON framing.
//!
//! The producer writes one JSON object per line. TCP gives us arbitrary
//! chunks, so a frame may arrive split across several reads, or several
//! frames may arrive in one read. [`FrameDecoder`] accumulates bytes and
//! hands out one decoded [`Value`] per complete line.
//!
//! ```text
//! chunk 1: {"a":1}\n{"b"      → emits {"a":1}, keeps {"b"
//! chunk 2: :2}\n              → emits {"b":2}
//! ```

use serde_json::Value;

use crate::ProtocolError;

/// Default cap on a single frame, in bytes.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Incremental decoder for newline-terminated JSON frames.
///
/// Blank and whitespace-only lines are skipped silently. A line that fails
/// to decode is reported once through [`next_frame`](Self::next_frame) and
/// then forgotten; it never poisons the frames after it.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Bytes received but not yet consumed as a frame.
    buf: Vec<u8>,
    /// How far into `buf` we've already searched for a newline.
    scanned: usize,
    /// Optional size cap for a single frame.
    max_frame_len: Option<usize>,
    /// Set after an oversized frame; bytes are dropped until the next newline.
    discarding: bool,
}

impl FrameDecoder {
    /// Creates a decoder with no frame size cap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a decoder that rejects frames longer than `limit` bytes.
    ///
    /// `None` disables the cap. Well-formed frames under the limit decode
    /// exactly as they would without one.
    pub fn with_max_frame_len(limit: Option<usize>) -> Self {
        Self {
            max_frame_len: limit,
            ..Self::default()
        }
    }

    /// Appends a chunk of raw bytes to the accumulation buffer.
    pub fn push(&mut self, chunk: &[u8]) {
        if self.discarding {
            match chunk.iter().position(|b| *b == b'\n') {
                Some(idx) => {
                    self.discarding = false;
                    self.buf.extend_from_slice(&chunk[idx + 1..]);
                }
                None => return,
            }
        } else {
            self.buf.extend_from_slice(chunk);
        }
    }

    /// Pops the next complete frame, decoded as JSON.
    ///
    /// Returns `None` once no complete frame remains in the buffer; the
    /// trailing partial line (if any) stays buffered for the next
    /// [`push`](Self::push).
    pub fn next_frame(&mut self) -> Option<Result<Value, ProtocolError>> {
        loop {
            let Some(offset) = self.buf[self.scanned..].iter().position(|b| *b == b'\n') else {
                self.scanned = self.buf.len();
                return self.check_oversized();
            };
            let end = self.scanned + offset;
            let line: Vec<u8> = self.buf.drain(..=end).collect();
            self.scanned = 0;

            let line = &line[..end];
            if let Some(limit) = self.max_frame_len {
                if line.len() > limit {
                    return Some(Err(ProtocolError::FrameTooLarge { limit }));
                }
            }

            let trimmed = line.trim_ascii();
            if trimmed.is_empty() {
                continue;
            }
            return Some(decode_frame(trimmed));
        }
    }

    /// Pushes a chunk and drains every complete frame it finished.
    ///
    /// Frames that fail to decode are logged at debug level and dropped.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<Value> {
        self.push(chunk);
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame() {
            match frame {
                Ok(value) => frames.push(value),
                Err(e) => tracing::debug!(error = %e, "dropping malformed frame"),
            }
        }
        frames
    }

    /// Number of bytes held for an incomplete frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drops any partially received frame.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.scanned = 0;
        self.discarding = false;
    }

    fn check_oversized(&mut self) -> Option<Result<Value, ProtocolError>> {
        let limit = self.max_frame_len?;
        if self.buf.len() <= limit {
            return None;
        }
        self.reset();
        self.discarding = true;
        Some(Err(ProtocolError::FrameTooLarge { limit }))
    }
}

/// Decodes one trimmed, non-empty frame.
pub fn decode_frame(bytes: &[u8]) -> Result<Value, ProtocolError> {
    let text = std::str::from_utf8(bytes)?;
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn drain(decoder: &mut FrameDecoder) -> Vec<Result<Value, ProtocolError>> {
        std::iter::from_fn(|| decoder.next_frame()).collect()
    }

    #[test]
    fn test_single_chunk_multiple_frames() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.decode(b"{\"a\":1}\n{\"b\":2}\n");
        assert_eq!(frames, vec![json!({"a": 1}), json!({"b": 2})]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_partial_frame_is_held_until_newline() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.decode(b"{\"sequence\":").is_empty());
        assert_eq!(decoder.buffered(), 12);

        let frames = decoder.decode(b"3}\n");
        assert_eq!(frames, vec![json!({"sequence": 3})]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_chunk_boundaries_do_not_change_output() {
        let stream: &[u8] =
            b"{\"message_type\":\"handshake\"}\n\n  \n{\"x\":[1,2,3]}\r\n{\"y\":\"z\"}\n{\"tail\":";
        let mut whole = FrameDecoder::new();
        let expected = whole.decode(stream);
        assert_eq!(expected.len(), 3);

        for split in 1..stream.len() {
            let mut decoder = FrameDecoder::new();
            let mut frames = decoder.decode(&stream[..split]);
            frames.extend(decoder.decode(&stream[split..]));
            assert_eq!(frames, expected, "split at {split}");
        }

        // And byte-at-a-time.
        let mut decoder = FrameDecoder::new();
        let frames: Vec<Value> = stream
            .iter()
            .flat_map(|b| decoder.decode(std::slice::from_ref(b)))
            .collect();
        assert_eq!(frames, expected);
    }

    #[test]
    fn test_whitespace_frames_are_skipped() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"\n   \n\t\r\n");
        assert!(drain(&mut decoder).is_empty());
    }

    #[test]
    fn test_malformed_frame_does_not_poison_stream() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"{\"message_type\":\"snapshot\",\n{\"ok\":true}\n");
        let results = drain(&mut decoder);
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], Err(ProtocolError::Decode(_))));
        assert_eq!(results[1].as_ref().ok(), Some(&json!({"ok": true})));
    }

    #[test]
    fn test_invalid_utf8_is_reported() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"\xff\xfe\n{}\n");
        let results = drain(&mut decoder);
        assert!(matches!(results[0], Err(ProtocolError::InvalidUtf8(_))));
        assert_eq!(results[1].as_ref().ok(), Some(&json!({})));
    }

    #[test]
    fn test_frame_cap_discards_until_next_newline() {
        let mut decoder = FrameDecoder::with_max_frame_len(Some(8));
        decoder.push(b"{\"long\":\"aaaaaaaa");
        let results = drain(&mut decoder);
        assert!(matches!(
            results.as_slice(),
            [Err(ProtocolError::FrameTooLarge { limit: 8 })]
        ));

        // The rest of the oversized line is thrown away, the next one decodes.
        decoder.push(b"aaaa\"}\n{\"n\":1}\n");
        let frames: Vec<Value> = drain(&mut decoder).into_iter().flatten().collect();
        assert_eq!(frames, vec![json!({"n": 1})]);
    }

    #[test]
    fn test_frame_cap_rejects_complete_oversized_line() {
        let mut decoder = FrameDecoder::with_max_frame_len(Some(4));
        decoder.push(b"[1,2,3,4]\n[1]\n");
        let results = drain(&mut decoder);
        assert!(matches!(results[0], Err(ProtocolError::FrameTooLarge { .. })));
        assert_eq!(results[1].as_ref().ok(), Some(&json!([1])));
    }

    #[test]
    fn test_reset_drops_partial_frame() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"{\"half\":");
        decoder.reset();
        assert_eq!(decoder.buffered(), 0);
        assert_eq!(decoder.decode(b"{}\n"), vec![json!({})]);
    }
}
