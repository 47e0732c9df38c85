//! Line decoding for the relay's NDJSON stream.

use firehose_core::RawEvent;

/// Decode one line. Blank lines carry nothing and yield `None`.
pub fn decode_line(line: &str) -> Option<Result<RawEvent, serde_json::Error>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str(line))
}
