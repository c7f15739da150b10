//! Connection lifecycle hooks.
//!
//! Optional diagnostics next to the status stream:
//!
//! - [`on_connect`](EventHandlers::on_connect): the transport is open
//! - [`on_disconnect`](EventHandlers::on_disconnect): the transport closed
//! - [`on_error`](EventHandlers::on_error): handshake failures, dropped links,
//!   exhausted reconnection, dispatch failures
//! - [`on_receive`](EventHandlers::on_receive) / [`on_send`](EventHandlers::on_send):
//!   raw frame tracing
//!
//! # Example
//!
//! ```rust,no_run
//! use store_link::{EventHandlers, StoreLinkClient};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let handlers = EventHandlers::new()
//!     .on_connect(|| println!("connected"))
//!     .on_error(|err| eprintln!("error (recoverable={}): {}", err.recoverable, err));
//!
//! let client = StoreLinkClient::builder()
//!     .url("https://api.shop.example/realtime")
//!     .event_handlers(handlers)
//!     .build()?;
//! client.connect();
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use crate::error::StoreLinkError;

/// Reason for a disconnect event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectReason {
    /// Human-readable description, e.g. `"network offline"` or the peer's close reason.
    pub message: String,
    /// WebSocket close code, if the peer sent one (1000 = normal, 1012 = service restart).
    pub code: Option<u16>,
}

impl DisconnectReason {
    /// Reason without a close code, used for client-side drops.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Reason carrying the close code from a server close frame.
    pub fn with_code(message: impl Into<String>, code: u16) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code: {})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Error information passed to the `on_error` hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionError {
    /// Human-readable error message.
    pub message: String,
    /// Whether reconnecting or re-sending may still succeed.
    pub recoverable: bool,
}

impl ConnectionError {
    /// Create a connection error.
    pub fn new(message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            message: message.into(),
            recoverable,
        }
    }

    /// Build from a client error, keeping its recoverability classification.
    pub fn from_error(err: &StoreLinkError) -> Self {
        Self::new(err.to_string(), err.is_recoverable())
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Callback for a freshly opened transport.
pub type OnConnectCallback = Arc<dyn Fn() + Send + Sync>;
/// Callback for a closed or dropped transport.
pub type OnDisconnectCallback = Arc<dyn Fn(DisconnectReason) + Send + Sync>;
/// Callback for failures the client recovered from or gave up on.
pub type OnErrorCallback = Arc<dyn Fn(ConnectionError) + Send + Sync>;
/// Raw inbound frame text.
pub type OnReceiveCallback = Arc<dyn Fn(&str) + Send + Sync>;
/// Raw outbound frame text.
pub type OnSendCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Optional lifecycle callbacks. All are invoked from the supervisor task and
/// must not block.
#[derive(Clone, Default)]
pub struct EventHandlers {
    /// Called once per successful handshake.
    pub(crate) on_connect: Option<OnConnectCallback>,
    /// Called when an open transport goes away, for any reason.
    pub(crate) on_disconnect: Option<OnDisconnectCallback>,
    /// Called for handshake failures, dropped links and dropped messages.
    pub(crate) on_error: Option<OnErrorCallback>,
    /// Debug hook for every inbound text frame.
    pub(crate) on_receive: Option<OnReceiveCallback>,
    /// Debug hook for every outbound text frame.
    pub(crate) on_send: Option<OnSendCallback>,
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_receive", &self.on_receive.is_some())
            .field("on_send", &self.on_send.is_some())
            .finish()
    }
}

impl EventHandlers {
    /// Create an empty set of handlers (all no-ops).
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for transport open.
    ///
    /// Fires after every successful handshake, including reconnects, before
    /// queued messages and topic subscriptions are replayed.
    ///
    /// # Example
    ///
    /// ```rust
    /// use store_link::EventHandlers;
    ///
    /// let handlers = EventHandlers::new().on_connect(|| {
    ///     println!("storefront feed is live");
    /// });
    /// ```
    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(f));
        self
    }

    /// Register a handler for transport close.
    ///
    /// Fires when an open transport closes: a server close frame, a failed
    /// write, `disconnect()`, a forced reconnect or an offline signal. It does
    /// not fire for handshakes that never completed.
    ///
    /// # Example
    ///
    /// ```rust
    /// use store_link::EventHandlers;
    ///
    /// let handlers = EventHandlers::new().on_disconnect(|reason| {
    ///     match reason.code {
    ///         Some(1012) => println!("backend restarting: {}", reason.message),
    ///         _ => println!("link closed: {}", reason),
    ///     }
    /// });
    /// ```
    pub fn on_disconnect(mut self, f: impl Fn(DisconnectReason) + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    /// Register the diagnostic error hook.
    ///
    /// Runtime failures never surface as `Err` from the client API; this hook
    /// and the status stream are where they show up. `recoverable == false`
    /// means the client stopped retrying.
    ///
    /// # Example
    ///
    /// ```rust
    /// use store_link::EventHandlers;
    ///
    /// let handlers = EventHandlers::new().on_error(|err| {
    ///     if !err.recoverable {
    ///         eprintln!("order sync gave up: {}", err);
    ///     }
    /// });
    /// ```
    pub fn on_error(mut self, f: impl Fn(ConnectionError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Register a debug hook for inbound frames.
    ///
    /// Receives the raw text of every frame before it is decoded, heartbeat
    /// acks included.
    ///
    /// # Example
    ///
    /// ```rust
    /// use store_link::EventHandlers;
    ///
    /// let handlers = EventHandlers::new().on_receive(|raw| {
    ///     println!("<- {}", raw);
    /// });
    /// ```
    pub fn on_receive(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_receive = Some(Arc::new(f));
        self
    }

    /// Register a debug hook for outbound frames.
    ///
    /// Receives the raw text of every frame once it was written: queued
    /// messages, subscriptions and heartbeats.
    ///
    /// # Example
    ///
    /// ```rust
    /// use store_link::EventHandlers;
    ///
    /// let handlers = EventHandlers::new().on_send(|raw| {
    ///     println!("-> {}", raw);
    /// });
    /// ```
    pub fn on_send(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_send = Some(Arc::new(f));
        self
    }

    /// Whether at least one handler is registered.
    pub fn has_any(&self) -> bool {
        self.on_connect.is_some()
            || self.on_disconnect.is_some()
            || self.on_error.is_some()
            || self.on_receive.is_some()
            || self.on_send.is_some()
    }

    pub(crate) fn emit_connect(&self) {
        if let Some(cb) = &self.on_connect {
            cb();
        }
    }

    pub(crate) fn emit_disconnect(&self, reason: DisconnectReason) {
        if let Some(cb) = &self.on_disconnect {
            cb(reason);
        }
    }

    pub(crate) fn emit_error(&self, error: ConnectionError) {
        if let Some(cb) = &self.on_error {
            cb(error);
        }
    }

    pub(crate) fn emit_receive(&self, raw: &str) {
        if let Some(cb) = &self.on_receive {
            cb(raw);
        }
    }

    pub(crate) fn emit_send(&self, raw: &str) {
        if let Some(cb) = &self.on_send {
            cb(raw);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_empty_handlers() {
        let handlers = EventHandlers::new();
        assert!(!handlers.has_any());
        handlers.emit_connect();
        handlers.emit_error(ConnectionError::new("ignored", true));
    }

    #[test]
    fn test_error_hook_receives_classification() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handlers = EventHandlers::new().on_error(move |err| sink.lock().push(err));

        handlers.emit_error(ConnectionError::from_error(&StoreLinkError::ReconnectExhausted(3)));
        handlers.emit_error(ConnectionError::from_error(&StoreLinkError::TransportError(
            "reset".into(),
        )));

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert!(!seen[0].recoverable);
        assert!(seen[1].recoverable);
        assert_eq!(seen[1].message, "Transport error: reset");
    }

    #[test]
    fn test_disconnect_reason_display() {
        assert_eq!(DisconnectReason::new("bye").to_string(), "bye");
        assert_eq!(DisconnectReason::with_code("going away", 1001).to_string(), "going away (code: 1001)");
    }

    #[test]
    fn test_debug_shows_registered_hooks() {
        let handlers = EventHandlers::new().on_send(|_| {});
        let debug = format!("{:?}", handlers);
        assert!(debug.contains("on_send: true"));
        assert!(debug.contains("on_connect: false"));
    }
}
