//! Message classification.
//!
//! Every decoded frame carries a `message_type` discriminator. Two values
//! are meaningful:
//!
//! - `"handshake"`: sent once per session, identifies the producer.
//! - `"snapshot"`: one game-state update.
//!
//! Anything else (including a missing discriminator, or a frame that isn't
//! a JSON object at all) is classified as [`Message::Unknown`] and ignored
//! by the bridge.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Snapshot;

/// Name of the discriminator field.
pub const MESSAGE_TYPE_FIELD: &str = "message_type";

/// Discriminator value for handshake messages.
pub const HANDSHAKE_TYPE: &str = "handshake";

/// Discriminator value for snapshot messages.
pub const SNAPSHOT_TYPE: &str = "snapshot";

/// Producer identification sent at the start of a session.
///
/// All fields are informational. Missing fields are kept as
/// [`Value::Null`] rather than rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Handshake {
    /// Game name reported by the producer.
    #[serde(default)]
    pub game: Value,
    /// Snapshot schema version.
    #[serde(default)]
    pub schema_version: Value,
    /// Producer plugin version.
    #[serde(default)]
    pub plugin_version: Value,
}

impl fmt::Display for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (schema v{}, plugin v{})",
            display_field(&self.game),
            display_field(&self.schema_version),
            display_field(&self.plugin_version),
        )
    }
}

/// Strings print without quotes; everything else prints as JSON.
fn display_field(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A classified message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Producer identification.
    Handshake(Handshake),
    /// A game-state update.
    Snapshot(Snapshot),
    /// Unrecognized or missing discriminator. Carries the discriminator
    /// when there was a string one.
    Unknown(Option<String>),
}

impl Message {
    /// Routes a decoded JSON value by its `message_type` field.
    ///
    /// Never fails: anything that can't be classified is `Unknown`.
    pub fn classify(value: Value) -> Self {
        let Value::Object(object) = value else {
            return Self::Unknown(None);
        };

        let kind = object
            .get(MESSAGE_TYPE_FIELD)
            .and_then(Value::as_str)
            .map(str::to_owned);

        match kind {
            Some(kind) if kind == HANDSHAKE_TYPE => {
                let field = |key: &str| object.get(key).cloned().unwrap_or(Value::Null);
                Self::Handshake(Handshake {
                    game: field("game"),
                    schema_version: field("schema_version"),
                    plugin_version: field("plugin_version"),
                })
            }
            // The object itself becomes the payload.
            Some(kind) if kind == SNAPSHOT_TYPE => Self::Snapshot(Snapshot::from_object(object)),
            other => Self::Unknown(other),
        }
    }

    /// Short name for logs.
    pub fn kind(&self) -> &str {
        match self {
            Self::Handshake(_) => HANDSHAKE_TYPE,
            Self::Snapshot(_) => SNAPSHOT_TYPE,
            Self::Unknown(Some(kind)) => kind,
            Self::Unknown(None) => "<none>",
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_classify_handshake() {
        let msg = Message::classify(json!({
            "message_type": "handshake",
            "game": "Enter the Gungeon",
            "schema_version": 2,
            "plugin_version": "0.3.1",
        }));
        let Message::Handshake(hs) = msg else {
            panic!("expected handshake, got {msg:?}");
        };
        assert_eq!(hs.game, json!("Enter the Gungeon"));
        assert_eq!(hs.schema_version, json!(2));
        assert_eq!(hs.to_string(), "Enter the Gungeon (schema v2, plugin v0.3.1)");
    }

    #[test]
    fn test_classify_handshake_with_missing_fields() {
        let msg = Message::classify(json!({ "message_type": "handshake" }));
        assert_eq!(msg, Message::Handshake(Handshake::default()));
        if let Message::Handshake(hs) = msg {
            assert_eq!(hs.to_string(), "null (schema vnull, plugin vnull)");
        }
    }

    #[test]
    fn test_classify_snapshot_keeps_whole_object() {
        let msg = Message::classify(json!({
            "message_type": "snapshot",
            "sequence": 7,
            "realtime": 1.5,
            "player": { "health": 10 },
            "custom": { "nested": [1, 2] },
        }));
        let Message::Snapshot(snap) = msg else {
            panic!("expected snapshot, got {msg:?}");
        };
        assert_eq!(snap.sequence(), 7);
        assert_eq!(snap.captured_at(), 1.5);
        assert_eq!(snap.player()["health"], json!(10));
        assert_eq!(snap.payload()["custom"]["nested"], json!([1, 2]));
        assert_eq!(snap.payload().len(), 5);
    }

    #[test]
    fn test_classify_unknown_type() {
        let msg = Message::classify(json!({ "message_type": "telemetry" }));
        assert_eq!(msg, Message::Unknown(Some("telemetry".into())));
        assert_eq!(msg.kind(), "telemetry");
    }

    #[test]
    fn test_classify_missing_or_non_string_discriminator() {
        assert_eq!(Message::classify(json!({ "sequence": 1 })), Message::Unknown(None));
        assert_eq!(
            Message::classify(json!({ "message_type": 5 })),
            Message::Unknown(None)
        );
    }

    #[test]
    fn test_classify_non_object() {
        assert_eq!(Message::classify(json!([1, 2, 3])), Message::Unknown(None));
        assert_eq!(Message::classify(json!("snapshot")), Message::Unknown(None));
    }
}
