//! The snapshot model: one point-in-time game state from the producer.
//!
//! A [`Snapshot`] is deliberately schema-free. Apart from the two envelope
//! fields (`sequence` and `realtime`) the whole decoded object is kept as
//! the payload, and domain sections are read through accessors that fall
//! back to an empty value instead of failing. The producer adds and renames
//! sections between plugin versions; consumers should never crash because
//! a section went missing.

use std::sync::LazyLock;

use serde_json::{Map, Value};

/// Shared empty object returned by section accessors when a section is
/// absent or has the wrong shape.
static EMPTY_OBJECT: LazyLock<Map<String, Value>> = LazyLock::new(Map::new);

/// Health value the producer emits when no player is spawned
/// (loading screens, menus, death).
pub const NO_PLAYER_HEALTH: f64 = -1.0;

/// An immutable game-state record.
///
/// Fields are private so the envelope values can never change after the
/// snapshot is built. Ownership moves from the network worker into the
/// handoff queue and then to whichever consumer dequeues it.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    sequence: u64,
    captured_at: f64,
    payload: Map<String, Value>,
}

impl Snapshot {
    /// Builds a snapshot from explicit parts.
    pub fn new(sequence: u64, captured_at: f64, payload: Map<String, Value>) -> Self {
        Self {
            sequence,
            captured_at,
            payload,
        }
    }

    /// Builds a snapshot from a decoded message object.
    ///
    /// `sequence` and `realtime` are coerced leniently (numbers, numeric
    /// strings) and default to `0` / `0.0` when absent or unusable. The
    /// object itself becomes the payload, so no section is lost.
    pub fn from_object(payload: Map<String, Value>) -> Self {
        let sequence = payload.get("sequence").and_then(coerce_u64).unwrap_or(0);
        let captured_at = payload.get("realtime").and_then(coerce_f64).unwrap_or(0.0);
        Self {
            sequence,
            captured_at,
            payload,
        }
    }

    /// Producer sequence number. Monotonic within a session, not gap-free.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Producer timestamp in seconds since an arbitrary epoch.
    pub fn captured_at(&self) -> f64 {
        self.captured_at
    }

    /// The full decoded message.
    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    /// Consumes the snapshot and returns the decoded message.
    pub fn into_payload(self) -> Map<String, Value> {
        self.payload
    }

    /// Raw access to any top-level field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// The `player` section, or an empty object.
    pub fn player(&self) -> &Map<String, Value> {
        self.object_section("player")
    }

    /// The `room` section, or an empty object.
    pub fn room(&self) -> &Map<String, Value> {
        self.object_section("room")
    }

    /// The `enemies` section, or an empty slice.
    pub fn enemies(&self) -> &[Value] {
        self.array_section("enemies")
    }

    /// The `projectiles` section, or an empty slice.
    pub fn projectiles(&self) -> &[Value] {
        self.array_section("projectiles")
    }

    /// Any top-level section that should be an object.
    pub fn object_section(&self, key: &str) -> &Map<String, Value> {
        match self.payload.get(key) {
            Some(Value::Object(map)) => map,
            _ => &EMPTY_OBJECT,
        }
    }

    /// Any top-level section that should be an array.
    pub fn array_section(&self, key: &str) -> &[Value] {
        match self.payload.get(key) {
            Some(Value::Array(items)) => items,
            _ => &[],
        }
    }

    /// Name of the level the record was captured in.
    ///
    /// Flat capture records carry `level_name` at the top level; live
    /// snapshots carry it as `room.level_name`.
    pub fn level_name(&self) -> Option<&str> {
        self.payload
            .get("level_name")
            .or_else(|| self.room().get("level_name"))
            .and_then(Value::as_str)
    }

    /// Player position as `(x, y)`.
    ///
    /// Reads flat `px`/`py` fields first, then `player.position.{x,y}`.
    pub fn position(&self) -> Option<(f64, f64)> {
        let flat = (
            self.payload.get("px").and_then(coerce_f64),
            self.payload.get("py").and_then(coerce_f64),
        );
        if let (Some(x), Some(y)) = flat {
            return Some((x, y));
        }
        let pos = self.player().get("position")?.as_object()?;
        Some((pos.get("x").and_then(coerce_f64)?, pos.get("y").and_then(coerce_f64)?))
    }

    /// Current player health, from the flat record or the player section.
    pub fn health(&self) -> Option<f64> {
        self.payload
            .get("health")
            .or_else(|| self.player().get("health"))
            .and_then(coerce_f64)
    }

    /// Whether the record describes a spawned player.
    ///
    /// Records from loading screens and menus carry the `-1` health
    /// sentinel. A missing health field counts as the sentinel.
    pub fn has_live_player(&self) -> bool {
        self.health().is_some_and(|h| h != NO_PLAYER_HEALTH)
    }
}

/// Lenient non-negative integer coercion.
///
/// Accepts integers, finite non-negative floats (truncated) and strings
/// holding either. Everything else yields `None`.
pub(crate) fn coerce_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite() && *f >= 0.0)
                    .map(|f| f as u64)
            })
        }
        _ => None,
    }
}

/// Lenient float coercion: numbers and numeric strings.
pub(crate) fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn snapshot(value: Value) -> Snapshot {
        match value {
            Value::Object(map) => Snapshot::from_object(map),
            other => panic!("test payload must be an object, got {other}"),
        }
    }

    #[test]
    fn test_from_object_reads_envelope_fields() {
        let snap = snapshot(json!({
            "message_type": "snapshot",
            "sequence": 7,
            "realtime": 1.5,
            "player": { "health": 10 }
        }));
        assert_eq!(snap.sequence(), 7);
        assert_eq!(snap.captured_at(), 1.5);
        assert_eq!(snap.player()["health"], json!(10));
        // The discriminator stays in the payload.
        assert_eq!(snap.get("message_type"), Some(&json!("snapshot")));
    }

    #[test]
    fn test_from_object_defaults_missing_fields() {
        let snap = snapshot(json!({ "message_type": "snapshot" }));
        assert_eq!(snap.sequence(), 0);
        assert_eq!(snap.captured_at(), 0.0);
    }

    #[test]
    fn test_from_object_defaults_invalid_fields() {
        let snap = snapshot(json!({ "sequence": "abc", "realtime": [1] }));
        assert_eq!(snap.sequence(), 0);
        assert_eq!(snap.captured_at(), 0.0);

        let snap = snapshot(json!({ "sequence": -4, "realtime": null }));
        assert_eq!(snap.sequence(), 0);
        assert_eq!(snap.captured_at(), 0.0);
    }

    #[test]
    fn test_from_object_coerces_numeric_strings_and_floats() {
        let snap = snapshot(json!({ "sequence": "12", "realtime": "3.25" }));
        assert_eq!(snap.sequence(), 12);
        assert_eq!(snap.captured_at(), 3.25);

        let snap = snapshot(json!({ "sequence": 9.8, "realtime": 2 }));
        assert_eq!(snap.sequence(), 9);
        assert_eq!(snap.captured_at(), 2.0);
    }

    #[test]
    fn test_section_accessors_default_when_absent() {
        let snap = snapshot(json!({ "sequence": 1 }));
        assert!(snap.player().is_empty());
        assert!(snap.room().is_empty());
        assert!(snap.enemies().is_empty());
        assert!(snap.projectiles().is_empty());
    }

    #[test]
    fn test_section_accessors_default_when_wrong_shape() {
        let snap = snapshot(json!({
            "player": [1, 2],
            "enemies": { "count": 3 },
            "room": "keep",
        }));
        assert!(snap.player().is_empty());
        assert!(snap.enemies().is_empty());
        assert!(snap.room().is_empty());
    }

    #[test]
    fn test_array_sections_pass_through() {
        let snap = snapshot(json!({
            "enemies": [{ "id": 1 }, { "id": 2 }],
            "projectiles": [{ "owner": "enemy" }],
        }));
        assert_eq!(snap.enemies().len(), 2);
        assert_eq!(snap.projectiles()[0]["owner"], json!("enemy"));
    }

    #[test]
    fn test_position_prefers_flat_fields() {
        let snap = snapshot(json!({ "px": 1.0, "py": 2.0 }));
        assert_eq!(snap.position(), Some((1.0, 2.0)));

        let snap = snapshot(json!({ "player": { "position": { "x": 3, "y": 4 } } }));
        assert_eq!(snap.position(), Some((3.0, 4.0)));

        let snap = snapshot(json!({ "px": 1.0 }));
        assert_eq!(snap.position(), None);
    }

    #[test]
    fn test_level_name_from_flat_or_room() {
        let snap = snapshot(json!({ "level_name": "Keep" }));
        assert_eq!(snap.level_name(), Some("Keep"));

        let snap = snapshot(json!({ "room": { "level_name": "Oubliette" } }));
        assert_eq!(snap.level_name(), Some("Oubliette"));
    }

    #[test]
    fn test_has_live_player_uses_health_sentinel() {
        assert!(!snapshot(json!({ "health": -1 })).has_live_player());
        assert!(!snapshot(json!({ "health": "-1" })).has_live_player());
        assert!(snapshot(json!({ "health": 3 })).has_live_player());
        assert!(!snapshot(json!({})).has_live_player());
        assert!(snapshot(json!({ "player": { "health": 4 } })).has_live_player());
    }
}
