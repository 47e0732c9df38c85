//! Translates WebSocket frames from the remote firehose into [`RawEvent`]s.

use firehose_core::RawEvent;
use serde_json::Value;

/// Outcome per event carried by a frame, in frame order.
pub type Decoded = Vec<Result<RawEvent, serde_json::Error>>;

/// Decode one text frame.
///
/// A frame carries either a single event object or an array of events
/// (batched delivery). Array elements decode independently: a malformed
/// element yields an `Err` in its slot and its siblings still decode.
pub fn decode_frame(text: &str) -> Decoded {
    match serde_json::from_str(text) {
        Ok(value) => decode_value(value),
        Err(e) => vec![Err(e)],
    }
}

/// Binary frames are accepted when they hold UTF-8 JSON.
pub fn decode_binary_frame(bytes: &[u8]) -> Decoded {
    match serde_json::from_slice(bytes) {
        Ok(value) => decode_value(value),
        Err(e) => vec![Err(e)],
    }
}

fn decode_value(value: Value) -> Decoded {
    match value {
        Value::Array(items) => items.into_iter().map(serde_json::from_value).collect(),
        single => vec![serde_json::from_value(single)],
    }
}
