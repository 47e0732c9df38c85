use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Reserved `event_type` for keep-alive events.
pub const HEARTBEAT_EVENT_TYPE: &str = "heartbeat";

// ─── Source Kind ──────────────────────────────────────────────────

/// Which upstream transport delivered an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Remote,
    Relay,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Relay => "relay",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Connection Status ────────────────────────────────────────────

/// Combined connectivity snapshot of both transports.
///
/// Derived on demand from the sources; never cached.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub remote_connected: bool,
    pub relay_connected: bool,
}

impl ConnectionStatus {
    /// The merged feed is live while at least one transport is up.
    pub fn is_connected(self) -> bool {
        self.remote_connected || self.relay_connected
    }
}

// ─── Raw Event ────────────────────────────────────────────────────

/// Unit flowing from a source into the multiplexer.
///
/// The wire shape is an open JSON object: unknown top-level fields are kept
/// in `extra` so that business identity (see [`crate::dedupe_key`]) covers
/// the full content of the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub event_id: String,
    pub event_type: String,
    /// Epoch milliseconds. May be absent, zero, or skewed.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_millis"
    )]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawEvent {
    pub fn new(
        session_id: impl Into<String>,
        event_id: impl Into<String>,
        event_type: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            event_id: event_id.into(),
            event_type: event_type.into(),
            timestamp: None,
            data: None,
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp_ms: i64) -> Self {
        self.timestamp = Some(timestamp_ms);
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn is_heartbeat(&self) -> bool {
        self.event_type == HEARTBEAT_EVENT_TYPE
    }

    /// Timestamp as a usable value: `None` when absent or zero.
    pub fn effective_timestamp(&self) -> Option<i64> {
        self.timestamp.filter(|&ts| ts != 0)
    }

    /// Typed view of the payload, keyed by `event_type`.
    ///
    /// Known tags whose `data` does not match the expected shape fall back
    /// to [`EventPayload::Unknown`] rather than failing.
    pub fn payload(&self) -> EventPayload {
        let typed = match self.event_type.as_str() {
            HEARTBEAT_EVENT_TYPE => Some(EventPayload::Heartbeat),
            "chunk" => self.decode_data().map(EventPayload::Chunk),
            "tool_call" => self.decode_data().map(EventPayload::ToolCall),
            "tool_result" => self.decode_data().map(EventPayload::ToolResult),
            "status" => self.decode_data().map(EventPayload::Status),
            "error" => self.decode_data().map(EventPayload::Error),
            _ => None,
        };
        typed.unwrap_or_else(|| EventPayload::Unknown {
            event_type: self.event_type.clone(),
            data: self.data.clone(),
        })
    }

    fn decode_data<T: for<'de> Deserialize<'de>>(&self) -> Option<T> {
        let data = self.data.clone().unwrap_or(Value::Null);
        serde_json::from_value(data).ok()
    }
}

/// Accepts integer, float (truncated), numeric string or null.
fn lenient_millis<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(truncate_millis)),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    })
}

#[expect(clippy::cast_possible_truncation)]
fn truncate_millis(ms: f64) -> i64 {
    ms as i64
}

// ─── Typed Payloads ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Heartbeat,
    Chunk(ChunkPayload),
    ToolCall(ToolCallPayload),
    ToolResult(ToolResultPayload),
    Status(StatusPayload),
    Error(ErrorPayload),
    /// Unrecognized tag, or a known tag with an unexpected payload shape.
    Unknown {
        event_type: String,
        data: Option<Value>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallPayload {
    #[serde(default)]
    pub call_id: Option<String>,
    pub tool_name: String,
    #[serde(default)]
    pub input: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultPayload {
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}

// ─── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn source_kind_display_matches_wire_name() {
        for kind in [SourceKind::Remote, SourceKind::Relay] {
            let wire = serde_json::to_value(kind).expect("serialize");
            assert_eq!(wire, json!(kind.to_string()));
        }
        assert!(serde_json::from_value::<SourceKind>(json!("satellite")).is_err());
    }

    #[test]
    fn status_or_semantics() {
        let both_down = ConnectionStatus::default();
        assert!(!both_down.is_connected());

        let relay_only = ConnectionStatus {
            remote_connected: false,
            relay_connected: true,
        };
        assert!(relay_only.is_connected());

        let both_up = ConnectionStatus {
            remote_connected: true,
            relay_connected: true,
        };
        assert!(both_up.is_connected());
    }

    #[test]
    fn status_serializes_camel_case() {
        let status = ConnectionStatus {
            remote_connected: true,
            relay_connected: false,
        };
        let value = serde_json::to_value(status).expect("serialize");
        assert_eq!(value, json!({"remoteConnected": true, "relayConnected": false}));
    }

    #[test]
    fn raw_event_keeps_unknown_fields() {
        let event: RawEvent = serde_json::from_value(json!({
            "session_id": "s1",
            "event_id": "e1",
            "event_type": "chunk",
            "timestamp": 1000,
            "data": {"text": "hi"},
            "agent": "planner"
        }))
        .expect("deserialize");

        assert_eq!(event.timestamp, Some(1000));
        assert_eq!(event.extra.get("agent"), Some(&json!("planner")));

        let back = serde_json::to_value(&event).expect("serialize");
        assert_eq!(back["agent"], json!("planner"));
    }

    #[test]
    fn timestamp_is_lenient() {
        let float: RawEvent =
            serde_json::from_value(json!({"event_type": "chunk", "timestamp": 1234.9}))
                .expect("float");
        assert_eq!(float.timestamp, Some(1234));

        let null: RawEvent =
            serde_json::from_value(json!({"event_type": "chunk", "timestamp": null}))
                .expect("null");
        assert_eq!(null.timestamp, None);

        let missing: RawEvent =
            serde_json::from_value(json!({"event_type": "chunk"})).expect("missing");
        assert_eq!(missing.timestamp, None);
    }

    #[test]
    fn zero_timestamp_is_not_effective() {
        let event = RawEvent::new("s1", "e1", "chunk").with_timestamp(0);
        assert_eq!(event.effective_timestamp(), None);
    }

    #[test]
    fn payload_known_tags() {
        let chunk = RawEvent::new("s1", "e1", "chunk").with_data(json!({"text": "hi"}));
        assert_eq!(
            chunk.payload(),
            EventPayload::Chunk(ChunkPayload { text: "hi".into() })
        );

        let call = RawEvent::new("s1", "e2", "tool_call")
            .with_data(json!({"tool_name": "bash", "input": {"cmd": "ls"}}));
        match call.payload() {
            EventPayload::ToolCall(p) => {
                assert_eq!(p.tool_name, "bash");
                assert_eq!(p.call_id, None);
            }
            other => panic!("expected tool call, got {other:?}"),
        }

        let hb = RawEvent::new("s1", "hb-1", HEARTBEAT_EVENT_TYPE);
        assert!(hb.is_heartbeat());
        assert_eq!(hb.payload(), EventPayload::Heartbeat);
    }

    #[test]
    fn payload_mismatched_shape_falls_back_to_unknown() {
        let event = RawEvent::new("s1", "e1", "chunk").with_data(json!({"txt": 3}));
        assert_eq!(
            event.payload(),
            EventPayload::Unknown {
                event_type: "chunk".into(),
                data: Some(json!({"txt": 3})),
            }
        );
    }

    #[test]
    fn payload_unknown_tag() {
        let event = RawEvent::new("s1", "e1", "plan_update");
        assert!(matches!(event.payload(), EventPayload::Unknown { .. }));
    }
}
