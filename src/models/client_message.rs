use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Client-to-server frame: `{"event": "<name>", "data": <json>}`.
///
/// Used for control messages (`subscribe:<topic>`, `unsubscribe:<topic>`,
/// `heartbeat`) and for arbitrary application sends alike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientMessage {
    pub event: String,

    #[serde(default)]
    pub data: JsonValue,
}

impl ClientMessage {
    pub fn new(event: impl Into<String>, data: JsonValue) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Heartbeat carrying the send time so the server can echo it back.
    pub fn heartbeat(timestamp_ms: u64) -> Self {
        Self::new("heartbeat", serde_json::json!({ "timestamp": timestamp_ms }))
    }
}
