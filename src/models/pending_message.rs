use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Diagnostic view of a queued outbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingMessage {
    pub event: String,
    pub payload: JsonValue,
    pub priority: i32,
    /// Failed writes so far.
    pub attempts: u32,
}
