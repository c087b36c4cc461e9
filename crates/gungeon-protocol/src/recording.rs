//! Reading recorded runs.
//!
//! Besides streaming live, the producer plugin writes every tick to a
//! capture file named `events_YYYYMMDD_HHMMSS.jsonl`. Each line is either a
//! flat player tick:
//!
//! ```text
//! {"sequence":12,"realtime":3.5,"level_name":"Keep","px":10.0,"py":4.0,"health":3,...}
//! ```
//!
//! or a marker dropped by the player:
//!
//! ```text
//! {"type":"mark","sequence":13,"realtime":3.6,"label":"boss door"}
//! ```
//!
//! This module is the read side only. Lines are turned into the same
//! [`Snapshot`] values the live bridge produces, so offline tools and live
//! consumers share one accessor surface.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::frame::decode_frame;
use crate::message::{MESSAGE_TYPE_FIELD, SNAPSHOT_TYPE};
use crate::snapshot::{coerce_f64, coerce_u64};
use crate::{ProtocolError, Snapshot};

/// File extension of capture files.
pub const RECORDING_EXTENSION: &str = "jsonl";

/// A user-placed marker in a recorded run.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    /// Sequence number of the marker.
    pub sequence: u64,
    /// Producer timestamp.
    pub realtime: f64,
    /// Free-form label.
    pub label: String,
}

/// One line of a recorded run.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// A game-state record.
    Snapshot(Snapshot),
    /// A marker.
    Marker(Marker),
}

impl Record {
    /// Turns one decoded line into a record.
    ///
    /// Returns `None` for non-objects and for live-protocol messages that
    /// aren't snapshots (handshakes, unknown types).
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(object) = value else {
            return None;
        };

        if object.get("type").and_then(Value::as_str) == Some("mark") {
            return Some(Self::Marker(Marker {
                sequence: object.get("sequence").and_then(coerce_u64).unwrap_or(0),
                realtime: object.get("realtime").and_then(coerce_f64).unwrap_or(0.0),
                label: object
                    .get("label")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned(),
            }));
        }

        // Captures have no discriminator; live dumps do.
        match object.get(MESSAGE_TYPE_FIELD).and_then(Value::as_str) {
            None | Some(SNAPSHOT_TYPE) => Some(Self::Snapshot(Snapshot::from_object(object))),
            Some(_) => None,
        }
    }

    /// The snapshot, if this record is one.
    pub fn as_snapshot(&self) -> Option<&Snapshot> {
        match self {
            Self::Snapshot(snap) => Some(snap),
            Self::Marker(_) => None,
        }
    }
}

/// Iterator over the records of a capture.
///
/// Blank lines are skipped. Lines that aren't valid JSON are logged at
/// debug level and skipped. I/O errors end the iteration with an `Err`.
pub struct RecordReader<R> {
    reader: R,
    line: Vec<u8>,
    line_no: usize,
    skipped: usize,
}

impl<R: BufRead> RecordReader<R> {
    /// Wraps a buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::new(),
            line_no: 0,
            skipped: 0,
        }
    }

    /// Number of malformed or unrecognized lines skipped so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = Result<Record, ProtocolError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.line.clear();
            match self.reader.read_until(b'\n', &mut self.line) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
            self.line_no += 1;

            let trimmed = self.line.trim_ascii();
            if trimmed.is_empty() {
                continue;
            }
            match decode_frame(trimmed).map(Record::from_value) {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => {
                    self.skipped += 1;
                    tracing::debug!(line = self.line_no, "skipping non-snapshot record");
                }
                Err(e) => {
                    self.skipped += 1;
                    tracing::debug!(line = self.line_no, error = %e, "skipping malformed record");
                }
            }
        }
    }
}

/// Opens a capture file for reading.
pub fn open_recording(path: impl AsRef<Path>) -> Result<RecordReader<BufReader<File>>, ProtocolError> {
    let file = File::open(path.as_ref())?;
    Ok(RecordReader::new(BufReader::new(file)))
}

/// Finds the newest capture in `dir`.
///
/// Capture names embed a sortable `YYYYMMDD_HHMMSS` stamp, so the newest
/// file is the lexicographically greatest `*.jsonl` name. Returns `Ok(None)`
/// when the directory holds no captures.
pub fn latest_recording(dir: impl AsRef<Path>) -> Result<Option<PathBuf>, ProtocolError> {
    let mut newest: Option<PathBuf> = None;
    for entry in std::fs::read_dir(dir.as_ref())? {
        let path = entry?.path();
        if !path.is_file()
            || path.extension().and_then(|e| e.to_str()) != Some(RECORDING_EXTENSION)
        {
            continue;
        }
        if newest.as_ref().is_none_or(|n| path.file_name() > n.file_name()) {
            newest = Some(path);
        }
    }
    Ok(newest)
}

/// Groups player positions by level, in record order.
///
/// Markers, records without a position and records without a live player
/// are left out. Records without a level name go under `"UNKNOWN"`.
pub fn paths_by_level<'a, I>(records: I) -> BTreeMap<String, Vec<(f64, f64)>>
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut paths: BTreeMap<String, Vec<(f64, f64)>> = BTreeMap::new();
    for snap in records.into_iter().filter_map(Record::as_snapshot) {
        if !snap.has_live_player() {
            continue;
        }
        let Some(point) = snap.position() else {
            continue;
        };
        let level = snap.level_name().unwrap_or("UNKNOWN");
        paths.entry(level.to_owned()).or_default().push(point);
    }
    paths
}
