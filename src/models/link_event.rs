use serde_json::Value as JsonValue;

use super::connection_status::ConnectionStatus;
use super::event_kind::EventKind;

/// An event delivered to multiplexer listeners.
///
/// Application payloads are opaque JSON; validating their shape is up to the
/// consuming layer.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// Connection state transition (reserved [`EventKind::Status`]).
    Status(ConnectionStatus),

    /// Inbound server event.
    Server {
        kind: EventKind,
        payload: JsonValue,
    },
}

impl LinkEvent {
    /// The registry key this event is dispatched under.
    pub fn kind(&self) -> EventKind {
        match self {
            LinkEvent::Status(_) => EventKind::Status,
            LinkEvent::Server { kind, .. } => kind.clone(),
        }
    }

    /// Payload of a server event.
    pub fn payload(&self) -> Option<&JsonValue> {
        match self {
            LinkEvent::Status(_) => None,
            LinkEvent::Server { payload, .. } => Some(payload),
        }
    }

    /// Status carried by a status event.
    pub fn status(&self) -> Option<&ConnectionStatus> {
        match self {
            LinkEvent::Status(status) => Some(status),
            LinkEvent::Server { .. } => None,
        }
    }
}
