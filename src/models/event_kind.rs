use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Name of an event flowing through the multiplexer.
///
/// Inbound frame names are decoded into this enum at the transport boundary,
/// so listeners match on variants instead of raw strings. Names the crate
/// does not know are kept verbatim in [`EventKind::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Reserved: connection status transitions published by the supervisor.
    Status,
    /// Server acknowledgement of a heartbeat (`heartbeat:ack`).
    HeartbeatAck,
    /// Server-assigned session identity (`session`).
    Session,
    /// Server-side error notification (`error`).
    ServerError,

    OrderCreated,
    OrderUpdated,
    OrderStatusChanged,

    DropUpdated,
    DropStockChanged,
    DropStarted,
    DropEnded,

    InventoryUpdated,
    InventoryLowStock,

    TicketCreated,
    TicketUpdated,
    TicketMessage,

    KpiUpdated,
    SystemHealth,
    Notification,
    ShopUpdated,
    ImageSync,

    BotStats,
    BotVerification,
    BotInviteCode,

    Custom(String),
}

impl EventKind {
    /// Decode a wire name.
    pub fn from_name(name: &str) -> Self {
        match name {
            "status" => EventKind::Status,
            "heartbeat:ack" => EventKind::HeartbeatAck,
            "session" => EventKind::Session,
            "error" => EventKind::ServerError,
            "order:created" => EventKind::OrderCreated,
            "order:updated" => EventKind::OrderUpdated,
            "order:status" => EventKind::OrderStatusChanged,
            "drop:updated" => EventKind::DropUpdated,
            "drop:stock" => EventKind::DropStockChanged,
            "drop:started" => EventKind::DropStarted,
            "drop:ended" => EventKind::DropEnded,
            "inventory:updated" => EventKind::InventoryUpdated,
            "inventory:low_stock" => EventKind::InventoryLowStock,
            "ticket:created" => EventKind::TicketCreated,
            "ticket:updated" => EventKind::TicketUpdated,
            "ticket:message" => EventKind::TicketMessage,
            "kpi:updated" => EventKind::KpiUpdated,
            "system:health" => EventKind::SystemHealth,
            "notification" => EventKind::Notification,
            "shop:updated" => EventKind::ShopUpdated,
            "image:sync" => EventKind::ImageSync,
            "bot:stats" => EventKind::BotStats,
            "bot:verification" => EventKind::BotVerification,
            "bot:invite_code" => EventKind::BotInviteCode,
            other => EventKind::Custom(other.to_string()),
        }
    }

    /// Wire name of this kind.
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Status => "status",
            EventKind::HeartbeatAck => "heartbeat:ack",
            EventKind::Session => "session",
            EventKind::ServerError => "error",
            EventKind::OrderCreated => "order:created",
            EventKind::OrderUpdated => "order:updated",
            EventKind::OrderStatusChanged => "order:status",
            EventKind::DropUpdated => "drop:updated",
            EventKind::DropStockChanged => "drop:stock",
            EventKind::DropStarted => "drop:started",
            EventKind::DropEnded => "drop:ended",
            EventKind::InventoryUpdated => "inventory:updated",
            EventKind::InventoryLowStock => "inventory:low_stock",
            EventKind::TicketCreated => "ticket:created",
            EventKind::TicketUpdated => "ticket:updated",
            EventKind::TicketMessage => "ticket:message",
            EventKind::KpiUpdated => "kpi:updated",
            EventKind::SystemHealth => "system:health",
            EventKind::Notification => "notification",
            EventKind::ShopUpdated => "shop:updated",
            EventKind::ImageSync => "image:sync",
            EventKind::BotStats => "bot:stats",
            EventKind::BotVerification => "bot:verification",
            EventKind::BotInviteCode => "bot:invite_code",
            EventKind::Custom(name) => name,
        }
    }

    /// Kinds the supervisor consumes itself before fan-out.
    pub fn is_control(&self) -> bool {
        matches!(self, EventKind::Status | EventKind::HeartbeatAck | EventKind::Session)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for EventKind {
    fn from(name: &str) -> Self {
        EventKind::from_name(name)
    }
}

impl From<String> for EventKind {
    fn from(name: String) -> Self {
        EventKind::from_name(&name)
    }
}

impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(EventKind::from_name(&name))
    }
}
