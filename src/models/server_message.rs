use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::event_kind::EventKind;

/// Server-to-client frame: `{"event": "<name>", "data": <json>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerMessage {
    pub event: EventKind,

    #[serde(default)]
    pub data: JsonValue,
}

impl ServerMessage {
    /// Timestamp echoed by `heartbeat:ack`.
    pub fn echoed_timestamp(&self) -> Option<u64> {
        self.data.get("timestamp").and_then(JsonValue::as_u64)
    }

    /// Session identity carried by `session` (`sid` or `id`).
    pub fn session_id(&self) -> Option<String> {
        self.data
            .get("sid")
            .or_else(|| self.data.get("id"))
            .and_then(JsonValue::as_str)
            .map(str::to_string)
    }
}
