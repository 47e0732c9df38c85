//! Content-based event identity.
//!
//! Two sources may describe the same occurrence with different `event_id`s
//! and different timestamps, so identity is the event content with every
//! timestamp-like field and the source-assigned `event_id` removed, hashed
//! down to a short key. Heartbeats carry no content besides their id, so
//! their `event_id` stays part of the identity.

use serde_json::{Map, Value};

use crate::types::RawEvent;

const EVENT_ID_FIELD: &str = "event_id";

const DJB2_SEED: i32 = 5381;

/// Dedupe key for `event`.
///
/// Falls back to `"{session_id}:{event_id}"` if the event cannot be
/// serialized.
pub fn dedupe_key(event: &RawEvent) -> String {
    match identity_string(event) {
        Ok(identity) => djb2_base36(&identity),
        Err(e) => {
            tracing::debug!(
                session_id = %event.session_id,
                event_id = %event.event_id,
                "dedupe key derivation failed, using id fallback: {e}"
            );
            fallback_key(event)
        }
    }
}

pub fn fallback_key(event: &RawEvent) -> String {
    format!("{}:{}", event.session_id, event.event_id)
}

/// Serialized event content with timestamp fields (and, for business
/// events, the `event_id`) stripped.
pub fn identity_string(event: &RawEvent) -> Result<String, serde_json::Error> {
    let mut value = strip_timestamps(&serde_json::to_value(event)?);
    if !event.is_heartbeat()
        && let Value::Object(map) = &mut value
    {
        map.remove(EVENT_ID_FIELD);
    }
    serde_json::to_string(&value)
}

/// Recursively drop every object key containing "timestamp"
/// (ASCII case-insensitive). String values holding a JSON object or array
/// are parsed and stripped as well; any other string is kept verbatim.
pub fn strip_timestamps(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| !is_timestamp_key(key))
                .map(|(key, v)| (key.clone(), strip_timestamps(v)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_timestamps).collect()),
        Value::String(s) => match embedded_json(s) {
            Some(parsed) => strip_timestamps(&parsed),
            None => value.clone(),
        },
        _ => value.clone(),
    }
}

fn is_timestamp_key(key: &str) -> bool {
    key.to_ascii_lowercase().contains("timestamp")
}

fn embedded_json(s: &str) -> Option<Value> {
    let trimmed = s.trim_start();
    if !trimmed.starts_with('{') && !trimmed.starts_with('[') {
        return None;
    }
    serde_json::from_str::<Value>(s)
        .ok()
        .filter(|v| v.is_object() || v.is_array())
}

// ─── djb2 ─────────────────────────────────────────────────────────

/// djb2 over UTF-16 code units with 32-bit wrapping arithmetic.
pub fn djb2(input: &str) -> i32 {
    input.encode_utf16().fold(DJB2_SEED, |hash, unit| {
        hash.wrapping_shl(5)
            .wrapping_add(hash)
            .wrapping_add(i32::from(unit))
    })
}

/// Absolute djb2 value rendered in base 36.
pub fn djb2_base36(input: &str) -> String {
    to_base36(djb2(input).unsigned_abs())
}

fn to_base36(mut n: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_owned();
    }
    let mut buf = Vec::with_capacity(7);
    while n > 0 {
        buf.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).unwrap_or_default()
}

// ─── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk(event_id: &str, timestamp: i64, text: &str) -> RawEvent {
        RawEvent::new("s1", event_id, "chunk")
            .with_timestamp(timestamp)
            .with_data(json!({ "text": text }))
    }

    #[test]
    fn djb2_reference_values() {
        assert_eq!(djb2(""), 5381);
        assert_eq!(djb2_base36(""), "45h");
        assert_eq!(djb2_base36("a"), "3t3a");
        assert_eq!(djb2_base36("hello"), "4bj995");
        assert_eq!(
            djb2_base36("The quick brown fox jumps over the lazy dog"),
            "endqzi"
        );
    }

    #[test]
    fn djb2_wraps_and_takes_absolute_value() {
        assert_eq!(djb2(r#"{"event_type":"chunk"}"#), -688_954_181);
        assert_eq!(djb2_base36(r#"{"event_type":"chunk"}"#), "be6og5");
    }

    #[test]
    fn djb2_hashes_utf16_units() {
        // The emoji is a surrogate pair: two code units.
        assert_eq!(djb2_base36("héllo😀"), "vbq6re");
    }

    #[test]
    fn strip_removes_nested_timestamp_keys() {
        let value = json!({
            "timestamp": 1,
            "data": {
                "createdTimestamp": 2,
                "TIMESTAMP_MS": 3,
                "items": [{"timestamp": 4, "keep": true}],
                "time": 5
            }
        });
        assert_eq!(
            strip_timestamps(&value),
            json!({"data": {"items": [{"keep": true}], "time": 5}})
        );
    }

    #[test]
    fn strip_descends_into_json_strings() {
        let value = json!({
            "args": r#"{"path":"/tmp","timestamp":99}"#,
            "note": "{not json",
            "plain": "42"
        });
        assert_eq!(
            strip_timestamps(&value),
            json!({"args": {"path": "/tmp"}, "note": "{not json", "plain": "42"})
        );
    }

    #[test]
    fn key_ignores_timestamp_but_not_content() {
        let a = chunk("a1", 1_000, "hi");
        let b = chunk("a1", 999_999_999, "hi");
        let c = chunk("a1", 1_000, "bye");

        assert_eq!(dedupe_key(&a), dedupe_key(&b));
        assert_ne!(dedupe_key(&a), dedupe_key(&c));
    }

    #[test]
    fn key_ignores_source_assigned_event_id() {
        assert_eq!(
            dedupe_key(&chunk("a1", 1_000, "hi")),
            dedupe_key(&chunk("b7", 999_999_999, "hi"))
        );
    }

    #[test]
    fn heartbeat_key_keeps_event_id() {
        let hb1 = RawEvent::new("s1", "hb-1", "heartbeat").with_timestamp(1);
        let hb1_later = RawEvent::new("s1", "hb-1", "heartbeat").with_timestamp(2);
        let hb2 = RawEvent::new("s1", "hb-2", "heartbeat").with_timestamp(1);
        assert_eq!(dedupe_key(&hb1), dedupe_key(&hb1_later));
        assert_ne!(dedupe_key(&hb1), dedupe_key(&hb2));
    }

    #[test]
    fn nested_event_id_is_content() {
        let a = chunk("a1", 1, "hi").with_data(json!({"text": "hi", "event_id": "x"}));
        let b = chunk("a1", 1, "hi").with_data(json!({"text": "hi", "event_id": "y"}));
        assert_ne!(dedupe_key(&a), dedupe_key(&b));
    }

    #[test]
    fn key_covers_extra_fields() {
        let mut a = chunk("a1", 1_000, "hi");
        let b = a.clone();
        a.extra.insert("agent".into(), json!("planner"));
        assert_ne!(dedupe_key(&a), dedupe_key(&b));
    }

    #[test]
    fn fallback_key_format() {
        assert_eq!(fallback_key(&chunk("a1", 0, "hi")), "s1:a1");
    }
}
