//! Error types for store-link.
//!
//! Runtime failures of the connection (handshake errors, dropped links,
//! heartbeat timeouts, failed dispatches, panicking listeners) never cross the
//! public API. They are reported through the status stream, the `on_error`
//! hook and the log. The error type is still shared by everything so that the
//! classification stays in one place.

use thiserror::Error;

/// Errors produced by the store-link client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreLinkError {
    /// Invalid or missing configuration (URL, options, config file).
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Handshake failure or mid-session drop of the transport.
    #[error("Transport error: {0}")]
    TransportError(String),

    /// An explicit timeout elapsed (handshake, send).
    #[error("Timeout: {0}")]
    TimeoutError(String),

    /// Heartbeat was not acknowledged in time. Only affects reported quality.
    #[error("Link degraded: {0}")]
    LinkDegraded(String),

    /// The reconnection policy gave up.
    #[error("Reconnection failed after {0} attempt(s)")]
    ReconnectExhausted(u32),

    /// A single outbound message could not be written to the transport.
    #[error("Dispatch error: {0}")]
    DispatchError(String),

    /// A subscriber callback panicked.
    #[error("Listener error: {0}")]
    ListenerError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl StoreLinkError {
    /// Whether retrying (reconnecting, re-sending) may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::TransportError(_)
                | Self::TimeoutError(_)
                | Self::LinkDegraded(_)
                | Self::DispatchError(_)
                | Self::ListenerError(_)
        )
    }
}

impl From<serde_json::Error> for StoreLinkError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl From<toml::de::Error> for StoreLinkError {
    fn from(err: toml::de::Error) -> Self {
        Self::ConfigurationError(format!("Failed to parse config: {}", err))
    }
}

impl From<std::io::Error> for StoreLinkError {
    fn from(err: std::io::Error) -> Self {
        Self::ConfigurationError(format!("Failed to read config: {}", err))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for StoreLinkError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::TransportError(err.to_string())
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, StoreLinkError>;
