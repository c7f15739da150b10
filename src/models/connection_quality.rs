use serde::{Deserialize, Serialize};

/// Link quality derived from the heartbeat cycle.
///
/// `latency_ms` is `None` when the quality is unknown: before the first
/// acknowledged heartbeat, after a heartbeat went unanswered, and while
/// disconnected. A previous measurement is never reported once it is stale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionQuality {
    /// Round-trip time of the most recent acknowledged heartbeat.
    pub latency_ms: Option<u64>,

    /// Millis since Unix epoch of the most recent heartbeat sent.
    pub last_ping_at_ms: Option<u64>,
}

impl ConnectionQuality {
    pub fn is_known(&self) -> bool {
        self.latency_ms.is_some()
    }
}
