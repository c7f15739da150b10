use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse connectivity state for status indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connected,
    Reconnecting,
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Snapshot of the connection, published on every state transition.
///
/// This is the only failure information meant for end users: `error` carries
/// a human-readable reason, individual retried messages never show up here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    /// Transport is open.
    pub connected: bool,

    /// A reconnection attempt is running or scheduled.
    pub reconnecting: bool,

    /// Reason of the last failure, if the link is down because of one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Millis since Unix epoch of the last successful connect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_connected_at_ms: Option<u64>,

    /// Opaque session id assigned by the server for the current connection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket_id: Option<String>,

    /// Consecutive failed connection attempts.
    pub reconnect_attempt: u32,

    /// Delay of the scheduled reconnection attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_in_ms: Option<u64>,
}

impl ConnectionStatus {
    /// Derive the coarse state.
    pub fn state(&self) -> ConnectionState {
        if self.connected {
            ConnectionState::Connected
        } else if self.reconnecting {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.error, self.retry_in_ms) {
            (Some(err), Some(ms)) => write!(f, "{} ({}; retry in {}ms)", self.state(), err, ms),
            (Some(err), None) => write!(f, "{} ({})", self.state(), err),
            (None, Some(ms)) => write!(f, "{} (retry in {}ms)", self.state(), ms),
            (None, None) => write!(f, "{}", self.state()),
        }
    }
}
