//! Data models for the store-link client.
//!
//! Wire frames, connection snapshots and client options.

pub mod client_message;
pub mod connection_options;
pub mod connection_quality;
pub mod connection_status;
pub mod event_kind;
pub mod link_event;
pub mod pending_message;
pub mod server_message;

#[cfg(test)]
mod tests;

pub use client_message::ClientMessage;
pub use connection_options::ConnectionOptions;
pub use connection_quality::ConnectionQuality;
pub use connection_status::{ConnectionState, ConnectionStatus};
pub use event_kind::EventKind;
pub use link_event::LinkEvent;
pub use pending_message::PendingMessage;
pub use server_message::ServerMessage;
