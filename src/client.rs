//! Main store-link client with builder pattern.
//!
//! [`StoreLinkClient`] is a cheap, cloneable handle to one supervised
//! connection. Every clone talks to the same background task; the task shuts
//! down once the last clone is dropped.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, oneshot, watch};

use crate::config::StoreLinkConfig;
use crate::connection::supervisor::{Command, Supervisor, SupervisorConfig, SupervisorShared};
use crate::connection::transport::{Connector, WsConnector};
use crate::credentials::{CredentialStore, EnvTokenStore, StaticToken};
use crate::environment::EnvironmentSource;
use crate::error::{Result, StoreLinkError};
use crate::event_handlers::EventHandlers;
use crate::models::{
    ConnectionOptions, ConnectionQuality, ConnectionStatus, EventKind, LinkEvent, PendingMessage,
};
use crate::multiplexer::{EventMultiplexer, ListenerId};
use crate::timeouts::StoreLinkTimeouts;
use crate::topics::{ActiveTopics, Topics};

/// Real-time sync client.
///
/// Public operations never block and never fail: connection problems show up
/// in [`status`](Self::status), the status listeners and the `on_error` hook.
///
/// # Examples
///
/// ```rust,no_run
/// use store_link::{EventKind, StoreLinkClient, TopicFilter};
///
/// # #[tokio::main]
/// # async fn main() -> store_link::Result<()> {
/// let client = StoreLinkClient::builder()
///     .url("https://api.shop.example/realtime")
///     .bearer_token("eyJhbGciOi...")
///     .build()?;
///
/// let subscriber = client.clone();
/// client.on_status(move |status| {
///     if status.connected {
///         subscriber.topics().subscribe_to_orders(TopicFilter::new());
///     }
/// });
/// client.on(EventKind::OrderCreated, |event| println!("new order: {:?}", event.payload()));
/// client.connect();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct StoreLinkClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    url: String,
    cmd_tx: mpsc::UnboundedSender<Command>,
    status_rx: watch::Receiver<ConnectionStatus>,
    quality_rx: watch::Receiver<ConnectionQuality>,
    connected: Arc<AtomicBool>,
    reconnect_attempts: Arc<AtomicU32>,
    multiplexer: Arc<EventMultiplexer>,
    active_topics: ActiveTopics,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(Command::Shutdown);
    }
}

impl fmt::Debug for StoreLinkClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreLinkClient")
            .field("url", &self.inner.url)
            .field("status", &*self.inner.status_rx.borrow())
            .finish()
    }
}

impl StoreLinkClient {
    /// Create a new builder for configuring the client.
    pub fn builder() -> StoreLinkClientBuilder {
        StoreLinkClientBuilder::new()
    }

    fn command(&self, cmd: Command) {
        if self.inner.cmd_tx.send(cmd).is_err() {
            log::debug!("[store-link] Command dropped: supervisor has stopped");
        }
    }

    /// Open the connection. No-op while connected or while an attempt or a
    /// scheduled retry is pending.
    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    /// Close the connection, cancel every timer and stop reacting to
    /// environment signals. Queued messages are kept for the next
    /// [`connect`](Self::connect).
    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    /// Drop the current link and try again after one fresh backoff delay,
    /// with the attempt counter reset.
    pub fn force_reconnect(&self) {
        self.command(Command::ForceReconnect);
    }

    /// Alias of [`force_reconnect`](Self::force_reconnect) for "retry now"
    /// buttons.
    pub fn reconnect(&self) {
        self.force_reconnect();
    }

    /// Queue an outbound message. Higher `priority` is sent first.
    pub fn send(&self, event: impl Into<String>, payload: JsonValue, priority: i32) {
        self.command(Command::Send {
            event: event.into(),
            payload,
            priority,
        });
    }

    /// Register a listener for `kind`.
    pub fn on<F>(&self, kind: EventKind, callback: F) -> ListenerId
    where
        F: Fn(&LinkEvent) + Send + Sync + 'static,
    {
        self.inner.multiplexer.on(kind, callback)
    }

    /// Remove one listener (`Some(id)`) or all listeners (`None`) of `kind`.
    pub fn off(&self, kind: &EventKind, id: Option<ListenerId>) -> usize {
        self.inner.multiplexer.off(kind, id)
    }

    /// Register a listener for connection status transitions.
    pub fn on_status<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&ConnectionStatus) + Send + Sync + 'static,
    {
        self.inner.multiplexer.on(EventKind::Status, move |event| {
            if let Some(status) = event.status() {
                callback(status);
            }
        })
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.status_rx.borrow().clone()
    }

    /// Watch channel following the status.
    pub fn status_receiver(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status_rx.clone()
    }

    pub fn quality(&self) -> ConnectionQuality {
        *self.inner.quality_rx.borrow()
    }

    pub fn quality_receiver(&self) -> watch::Receiver<ConnectionQuality> {
        self.inner.quality_rx.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Consecutive failed connection attempts.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// Snapshot of the outbound queue in dispatch order.
    pub async fn pending_messages(&self) -> Vec<PendingMessage> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::PendingSnapshot(tx));
        rx.await.unwrap_or_default()
    }

    /// Topic subscription operations.
    pub fn topics(&self) -> Topics<'_> {
        Topics::new(self)
    }

    /// Keys of the subscriptions replayed on reconnect.
    pub fn active_topics(&self) -> Vec<String> {
        self.inner.active_topics.keys()
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub(crate) fn active_topic_registry(&self) -> &ActiveTopics {
        &self.inner.active_topics
    }
}

/// Builder for [`StoreLinkClient`].
pub struct StoreLinkClientBuilder {
    url: Option<String>,
    credentials: Option<Arc<dyn CredentialStore>>,
    connection_options: ConnectionOptions,
    timeouts: StoreLinkTimeouts,
    event_handlers: EventHandlers,
    connector: Option<Arc<dyn Connector>>,
    environment: Option<EnvironmentSource>,
}

impl fmt::Debug for StoreLinkClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreLinkClientBuilder")
            .field("url", &self.url)
            .field("credentials", &self.credentials.is_some())
            .field("connection_options", &self.connection_options)
            .field("timeouts", &self.timeouts)
            .field("event_handlers", &self.event_handlers)
            .field("custom_connector", &self.connector.is_some())
            .field("environment", &self.environment.is_some())
            .finish()
    }
}

impl StoreLinkClientBuilder {
    fn new() -> Self {
        Self {
            url: None,
            credentials: None,
            connection_options: ConnectionOptions::default(),
            timeouts: StoreLinkTimeouts::default(),
            event_handlers: EventHandlers::default(),
            connector: None,
            environment: None,
        }
    }

    /// Backend endpoint. `http(s)://` is mapped to `ws(s)://`.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Credential source consulted before every connection attempt.
    pub fn credentials(mut self, store: impl CredentialStore + 'static) -> Self {
        self.credentials = Some(Arc::new(store));
        self
    }

    /// Shorthand for a fixed bearer token.
    pub fn bearer_token(self, token: impl Into<String>) -> Self {
        self.credentials(StaticToken::new(token))
    }

    pub fn connection_options(mut self, options: ConnectionOptions) -> Self {
        self.connection_options = options;
        self
    }

    pub fn timeouts(mut self, timeouts: StoreLinkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn event_handlers(mut self, handlers: EventHandlers) -> Self {
        self.event_handlers = handlers;
        self
    }

    /// Replace the WebSocket connector, e.g. with an in-memory transport.
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Environment signals, observed from `build()` until `disconnect()` and
    /// again after the next `connect()`. See
    /// [`environment::channel`](crate::environment::channel).
    pub fn environment(mut self, source: EnvironmentSource) -> Self {
        self.environment = Some(source);
        self
    }

    /// Take URL, options, timeouts and token variable from a config file.
    pub fn from_config(self, config: &StoreLinkConfig) -> Self {
        self.url(config.url.clone())
            .connection_options(config.connection.clone())
            .timeouts(config.timeouts.to_timeouts())
            .credentials(EnvTokenStore::new(config.token_env.clone()))
    }

    /// Build the client and spawn its supervisor task.
    ///
    /// Must be called from within a Tokio runtime. The URL itself is only
    /// validated on `connect()`, where a malformed URL shows up in the status.
    pub fn build(self) -> Result<StoreLinkClient> {
        let url = self
            .url
            .ok_or_else(|| StoreLinkError::ConfigurationError("url is required".to_string()))?;

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            StoreLinkError::ConfigurationError(
                "StoreLinkClient must be built inside a Tokio runtime".to_string(),
            )
        })?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::default());
        let (quality_tx, quality_rx) = watch::channel(ConnectionQuality::default());
        let connected = Arc::new(AtomicBool::new(false));
        let reconnect_attempts = Arc::new(AtomicU32::new(0));
        let multiplexer = Arc::new(EventMultiplexer::new());
        let active_topics = ActiveTopics::default();

        let supervisor = Supervisor::new(
            SupervisorConfig {
                url: url.clone(),
                credentials: self.credentials,
                connector: self.connector.unwrap_or_else(|| Arc::new(WsConnector::new())),
                options: self.connection_options,
                timeouts: self.timeouts,
                handlers: self.event_handlers,
            },
            SupervisorShared {
                status_tx,
                quality_tx,
                connected: Arc::clone(&connected),
                reconnect_attempts: Arc::clone(&reconnect_attempts),
                multiplexer: Arc::clone(&multiplexer),
                active_topics: active_topics.clone(),
            },
            cmd_rx,
            self.environment.map(EnvironmentSource::into_receiver),
        );
        runtime.spawn(supervisor.run());

        Ok(StoreLinkClient {
            inner: Arc::new(ClientInner {
                url,
                cmd_tx,
                status_rx,
                quality_rx,
                connected,
                reconnect_attempts,
                multiplexer,
                active_topics,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_requires_url() {
        let err = StoreLinkClient::builder().build().unwrap_err();
        assert!(matches!(err, StoreLinkError::ConfigurationError(_)));
    }

    #[test]
    fn test_build_requires_runtime() {
        let err = StoreLinkClient::builder().url("http://localhost:4000").build().unwrap_err();
        assert!(err.to_string().contains("Tokio runtime"));
    }

    #[tokio::test]
    async fn test_fresh_client_is_disconnected() {
        let client = StoreLinkClient::builder().url("http://localhost:4000").build().unwrap();
        assert!(!client.is_connected());
        assert_eq!(client.status(), ConnectionStatus::default());
        assert!(!client.quality().is_known());
        assert_eq!(client.reconnect_attempts(), 0);
        assert!(client.pending_messages().await.is_empty());
        assert_eq!(client.url(), "http://localhost:4000");
    }

    #[tokio::test]
    async fn test_send_while_disconnected_stays_queued() {
        let client = StoreLinkClient::builder().url("http://localhost:4000").build().unwrap();
        client.send("cart:update", serde_json::json!({ "sku": "A1" }), 0);
        client.send("cart:checkout", serde_json::json!({}), 10);

        let pending = client.pending_messages().await;
        let events: Vec<&str> = pending.iter().map(|p| p.event.as_str()).collect();
        assert_eq!(events, vec!["cart:checkout", "cart:update"]);
    }
}
