//! # store-link
//!
//! Real-time synchronization client for the storefront and admin dashboard
//! backend.
//!
//! One [`StoreLinkClient`] owns one supervised WebSocket connection:
//!
//! - **Connection supervisor**: connect, reconnect with jittered exponential
//!   backoff, heartbeat quality tracking, environment-driven recovery
//! - **Event multiplexer**: fan-out of inbound events and status transitions
//!   to listeners, with per-listener fault isolation
//! - **Outbound scheduler**: priority queue with batched flushing and bounded
//!   retries; messages sent while offline are kept until the next connect
//! - **Topic façade**: typed subscribe/unsubscribe helpers, replayed after a
//!   reconnect
//!
//! Delivery is at-least-once. Outbound order is priority first, then arrival;
//! callers must not assume total ordering across priorities.
//!
//! ## Example
//!
//! ```rust,no_run
//! use store_link::{EventKind, StoreLinkClient};
//!
//! # #[tokio::main]
//! # async fn main() -> store_link::Result<()> {
//! let client = StoreLinkClient::builder()
//!     .url("https://api.shop.example/realtime")
//!     .bearer_token("eyJhbGciOi...")
//!     .build()?;
//!
//! client.on(EventKind::InventoryUpdated, |event| {
//!     println!("stock changed: {:?}", event.payload());
//! });
//! client.connect();
//! client.send("cart:sync", serde_json::json!({ "items": 3 }), 5);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod credentials;
pub mod environment;
pub mod error;
pub mod event_handlers;
pub mod models;
pub mod multiplexer;
pub mod retry;
pub mod scheduler;
pub mod timeouts;
pub mod topics;

pub use client::{StoreLinkClient, StoreLinkClientBuilder};
pub use config::StoreLinkConfig;
pub use connection::resolve_ws_url;
pub use connection::transport::{ConnectRequest, Connector, Frame, Transport, WsConnector};
pub use credentials::{CredentialStore, EnvTokenStore, StaticToken};
pub use environment::{EnvironmentNotifier, EnvironmentSignal, EnvironmentSource};
pub use error::{Result, StoreLinkError};
pub use event_handlers::{ConnectionError, DisconnectReason, EventHandlers};
pub use models::{
    ClientMessage, ConnectionOptions, ConnectionQuality, ConnectionState, ConnectionStatus,
    EventKind, LinkEvent, PendingMessage, ServerMessage,
};
pub use multiplexer::{DispatchOutcome, EventMultiplexer, ListenerId};
pub use retry::{retry_with_backoff, AttemptError, BackoffPolicy, RetryError};
pub use scheduler::DEFAULT_PRIORITY;
pub use timeouts::{StoreLinkTimeouts, StoreLinkTimeoutsBuilder};
pub use topics::{BotComponent, ShopChannel, Topic, TopicFilter, Topics};
