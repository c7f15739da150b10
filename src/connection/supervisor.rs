//! Connection supervisor.
//!
//! A single tokio task owns the transport, the outbound queue, the heartbeat
//! cycle and every timer. The public client talks to it through an unbounded
//! command channel, so no public operation ever waits on the network.
//!
//! ```text
//!            connect()                 handshake ok
//!   Idle ───────────────► Connecting ───────────────► Connected
//!    ▲                      │   ▲                        │
//!    │ disconnect()         │   │ retry timer            │ close / error / failed send
//!    │                      ▼   │                        ▼
//!    └──────────────────── Waiting ◄──────────────────────┘
//!                           │ attempts used up
//!                           ▼
//!                        Exhausted
//! ```
//!
//! `Offline` is entered from any phase when the environment reports the
//! network gone, and left again on `Online`, `Visible` or `connect()`.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use log::{debug, error, info, warn};
use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

use super::heartbeat::HeartbeatMonitor;
use super::transport::{ConnectRequest, Connector, Frame, Transport};
use super::{deadline_after, now_ms, parse_server_message, resolve_ws_url};
use crate::credentials::CredentialStore;
use crate::environment::EnvironmentSignal;
use crate::error::{Result, StoreLinkError};
use crate::event_handlers::{ConnectionError, DisconnectReason, EventHandlers};
use crate::models::{
    ClientMessage, ConnectionOptions, ConnectionQuality, ConnectionStatus, EventKind, LinkEvent,
    PendingMessage, ServerMessage,
};
use crate::multiplexer::EventMultiplexer;
use crate::retry::BackoffPolicy;
use crate::scheduler::{OutboundScheduler, DEFAULT_PRIORITY};
use crate::timeouts::StoreLinkTimeouts;
use crate::topics::ActiveTopics;

/// Status error once the reconnection budget is used up.
pub(crate) const RECONNECTION_FAILED: &str = "reconnection failed";

/// Status error while the environment reports no network.
pub(crate) const NETWORK_OFFLINE: &str = "network offline";

type AttemptFuture = Pin<Box<dyn Future<Output = Result<Box<dyn Transport>>> + Send>>;

/// Commands sent from the public API to the supervisor task.
pub(crate) enum Command {
    Connect,
    Disconnect,
    ForceReconnect,
    Send {
        event: String,
        payload: JsonValue,
        priority: i32,
    },
    PendingSnapshot(oneshot::Sender<Vec<PendingMessage>>),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Connecting,
    Connected,
    Waiting { until: Instant },
    Exhausted,
    Offline,
}

/// What woke the supervisor loop.
enum Wake {
    Command(Option<Command>),
    Environment(Option<EnvironmentSignal>),
    Attempt(Result<Box<dyn Transport>>),
    Frame(Option<Result<Frame>>),
    AckTimeout,
    Heartbeat,
    Flush,
    Retry,
}

/// Static inputs of the supervisor.
pub(crate) struct SupervisorConfig {
    pub url: String,
    pub credentials: Option<Arc<dyn CredentialStore>>,
    pub connector: Arc<dyn Connector>,
    pub options: ConnectionOptions,
    pub timeouts: StoreLinkTimeouts,
    pub handlers: EventHandlers,
}

/// State the supervisor shares with client handles.
pub(crate) struct SupervisorShared {
    pub status_tx: watch::Sender<ConnectionStatus>,
    pub quality_tx: watch::Sender<ConnectionQuality>,
    pub connected: Arc<AtomicBool>,
    pub reconnect_attempts: Arc<AtomicU32>,
    pub multiplexer: Arc<EventMultiplexer>,
    pub active_topics: ActiveTopics,
}

pub(crate) struct Supervisor {
    config: SupervisorConfig,
    shared: SupervisorShared,
    policy: BackoffPolicy,

    cmd_rx: mpsc::UnboundedReceiver<Command>,
    env_rx: Option<mpsc::UnboundedReceiver<EnvironmentSignal>>,
    env_attached: bool,

    phase: Phase,
    attempts: u32,
    attempt: Option<AttemptFuture>,
    transport: Option<Box<dyn Transport>>,

    scheduler: OutboundScheduler,
    heartbeat: HeartbeatMonitor,
    status: ConnectionStatus,
}

impl Supervisor {
    pub(crate) fn new(
        config: SupervisorConfig,
        shared: SupervisorShared,
        cmd_rx: mpsc::UnboundedReceiver<Command>,
        env_rx: Option<mpsc::UnboundedReceiver<EnvironmentSignal>>,
    ) -> Self {
        let policy = BackoffPolicy::from_options(&config.options);
        let scheduler = OutboundScheduler::new(&config.options);
        let heartbeat = HeartbeatMonitor::new(&config.timeouts);
        let status = shared.status_tx.borrow().clone();

        Self {
            config,
            shared,
            policy,
            cmd_rx,
            env_rx,
            env_attached: true,
            phase: Phase::Idle,
            attempts: 0,
            attempt: None,
            transport: None,
            scheduler,
            heartbeat,
            status,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            match self.next_wake().await {
                Wake::Command(Some(Command::Shutdown)) | Wake::Command(None) => break,
                Wake::Command(Some(cmd)) => self.handle_command(cmd).await,
                Wake::Environment(Some(signal)) => self.handle_environment(signal).await,
                Wake::Environment(None) => {
                    debug!("[store-link] Environment source closed");
                    self.env_rx = None;
                },
                Wake::Attempt(result) => {
                    self.attempt = None;
                    match result {
                        Ok(transport) => self.on_connected(transport).await,
                        Err(err) => self.on_connect_failed(err),
                    }
                },
                Wake::Frame(frame) => self.handle_frame(frame).await,
                Wake::AckTimeout => self.on_heartbeat_timeout(),
                Wake::Heartbeat => self.send_heartbeat().await,
                Wake::Flush => self.flush().await,
                Wake::Retry => self.start_attempt(),
            }
        }

        self.shutdown().await;
    }

    async fn next_wake(&mut self) -> Wake {
        let ack_at = self.heartbeat.ack_deadline();
        let ping_at = self.heartbeat.next_ping_deadline();
        let flush_at = self.scheduler.flush_deadline();
        let retry_at = match self.phase {
            Phase::Waiting { until } => Some(until),
            _ => None,
        };

        let cmd_rx = &mut self.cmd_rx;
        let env_rx = &mut self.env_rx;
        let attempt = &mut self.attempt;
        let transport = &mut self.transport;

        tokio::select! {
            biased;
            cmd = cmd_rx.recv() => Wake::Command(cmd),
            signal = recv_environment(env_rx) => Wake::Environment(signal),
            result = poll_attempt(attempt) => Wake::Attempt(result),
            frame = next_frame(transport) => Wake::Frame(frame),
            _ = sleep_until(ack_at) => Wake::AckTimeout,
            _ = sleep_until(ping_at) => Wake::Heartbeat,
            _ = sleep_until(flush_at) => Wake::Flush,
            _ = sleep_until(retry_at) => Wake::Retry,
        }
    }

    // ── Commands ────────────────────────────────────────────────────────

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect => self.connect(),
            Command::Disconnect => self.disconnect().await,
            Command::ForceReconnect => self.force_reconnect().await,
            Command::Send {
                event,
                payload,
                priority,
            } => {
                let flush_now = self.scheduler.enqueue(event, payload, priority);
                if self.phase == Phase::Connected {
                    if flush_now {
                        self.flush().await;
                    } else {
                        self.scheduler.arm();
                    }
                }
            },
            Command::PendingSnapshot(reply) => {
                let _ = reply.send(self.scheduler.snapshot());
            },
            Command::Shutdown => {},
        }
    }

    fn connect(&mut self) {
        self.env_attached = true;
        match self.phase {
            Phase::Connected | Phase::Connecting | Phase::Waiting { .. } => {
                debug!("[store-link] connect() ignored: already {:?}", self.phase);
            },
            Phase::Idle | Phase::Exhausted | Phase::Offline => {
                self.set_attempts(0);
                self.start_attempt();
            },
        }
    }

    async fn disconnect(&mut self) {
        self.env_attached = false;
        let was_connected = self.drop_link(true).await;
        if was_connected {
            self.config.handlers.emit_disconnect(DisconnectReason::new("Client disconnected"));
        }

        self.set_attempts(0);
        self.phase = Phase::Idle;
        info!("[store-link] Disconnected ({} message(s) kept queued)", self.scheduler.len());
        self.set_status(ConnectionStatus {
            last_connected_at_ms: self.status.last_connected_at_ms,
            ..Default::default()
        });
    }

    async fn force_reconnect(&mut self) {
        self.env_attached = true;
        let was_connected = self.drop_link(true).await;
        if was_connected {
            self.config.handlers.emit_disconnect(DisconnectReason::new("Reconnect requested"));
        }

        self.set_status(ConnectionStatus {
            last_connected_at_ms: self.status.last_connected_at_ms,
            ..Default::default()
        });

        self.set_attempts(0);
        let delay = self.policy.delay_for(0);
        info!("[store-link] Forced reconnect in {}ms", delay.as_millis());
        self.phase = Phase::Waiting {
            until: deadline_after(Instant::now(), delay),
        };
        self.set_status(ConnectionStatus {
            reconnecting: true,
            last_connected_at_ms: self.status.last_connected_at_ms,
            retry_in_ms: Some(delay.as_millis() as u64),
            ..Default::default()
        });
    }

    // ── Environment ─────────────────────────────────────────────────────

    async fn handle_environment(&mut self, signal: EnvironmentSignal) {
        if !self.env_attached {
            debug!("[store-link] Ignoring environment signal '{}' (not observing)", signal);
            return;
        }

        match signal {
            EnvironmentSignal::Visible | EnvironmentSignal::Online => match self.phase {
                Phase::Idle | Phase::Exhausted | Phase::Offline => {
                    info!("[store-link] Environment '{}': reconnecting now", signal);
                    self.set_attempts(0);
                    self.start_attempt();
                },
                _ => debug!("[store-link] Environment '{}' ignored in {:?}", signal, self.phase),
            },
            EnvironmentSignal::Offline => {
                let was_connected = self.drop_link(false).await;
                if was_connected {
                    self.config.handlers.emit_disconnect(DisconnectReason::new(NETWORK_OFFLINE));
                }
                warn!("[store-link] Network offline; reconnection suspended");
                self.phase = Phase::Offline;
                self.set_status(ConnectionStatus {
                    error: Some(NETWORK_OFFLINE.to_string()),
                    last_connected_at_ms: self.status.last_connected_at_ms,
                    reconnect_attempt: self.attempts,
                    ..Default::default()
                });
            },
            EnvironmentSignal::Hidden => {
                debug!("[store-link] Application hidden");
            },
        }
    }

    // ── Connection lifecycle ────────────────────────────────────────────

    fn start_attempt(&mut self) {
        let url = match resolve_ws_url(&self.config.url) {
            Ok(url) => url,
            Err(err) => {
                error!("[store-link] {}", err);
                self.config.handlers.emit_error(ConnectionError::from_error(&err));
                self.phase = Phase::Idle;
                self.set_status(ConnectionStatus {
                    error: Some(err.to_string()),
                    last_connected_at_ms: self.status.last_connected_at_ms,
                    ..Default::default()
                });
                return;
            },
        };

        if !self.status.reconnecting {
            self.set_status(ConnectionStatus {
                reconnecting: true,
                last_connected_at_ms: self.status.last_connected_at_ms,
                reconnect_attempt: self.attempts,
                ..Default::default()
            });
        }

        let request = ConnectRequest {
            url,
            bearer_token: self.config.credentials.as_ref().and_then(|c| c.bearer_token()),
        };
        debug!(
            "[store-link] Connecting to {} (attempt {})",
            request.url,
            self.attempts + 1
        );

        let connector = Arc::clone(&self.config.connector);
        let handshake_timeout = self.config.timeouts.handshake_timeout;
        self.attempt = Some(Box::pin(async move {
            if StoreLinkTimeouts::is_no_timeout(handshake_timeout) {
                return connector.connect(&request).await;
            }
            match tokio::time::timeout(handshake_timeout, connector.connect(&request)).await {
                Ok(result) => result,
                Err(_) => Err(StoreLinkError::TimeoutError(format!(
                    "Handshake timed out after {:?}",
                    handshake_timeout
                ))),
            }
        }));
        self.phase = Phase::Connecting;
    }

    async fn on_connected(&mut self, transport: Box<dyn Transport>) {
        info!("[store-link] Connected to {}", self.config.url);
        self.transport = Some(transport);
        self.phase = Phase::Connected;
        self.set_attempts(0);
        self.shared.connected.store(true, Ordering::SeqCst);

        self.heartbeat.start();
        self.publish_quality();

        self.set_status(ConnectionStatus {
            connected: true,
            last_connected_at_ms: Some(now_ms()),
            ..Default::default()
        });
        self.config.handlers.emit_connect();

        if self.config.options.resubscribe_on_reconnect {
            let topics = self.shared.active_topics.messages();
            if !topics.is_empty() {
                info!("[store-link] Replaying {} topic subscription(s)", topics.len());
            }
            for msg in topics {
                self.scheduler.enqueue(msg.event, msg.data, DEFAULT_PRIORITY);
            }
        }

        if !self.scheduler.is_empty() {
            self.flush().await;
        }
    }

    fn on_connect_failed(&mut self, err: StoreLinkError) {
        self.set_attempts(self.attempts + 1);
        warn!("[store-link] Connection attempt {} failed: {}", self.attempts, err);
        self.config.handlers.emit_error(ConnectionError::from_error(&err));

        if !self.config.options.auto_reconnect {
            self.phase = Phase::Idle;
            self.set_status(ConnectionStatus {
                error: Some(err.to_string()),
                last_connected_at_ms: self.status.last_connected_at_ms,
                reconnect_attempt: self.attempts,
                ..Default::default()
            });
            return;
        }

        if self.policy.is_exhausted(self.attempts) {
            self.exhaust();
            return;
        }

        let delay = self.policy.delay_for(self.attempts - 1);
        self.schedule_retry(delay, err.to_string());
    }

    /// The live transport went away without being asked to.
    ///
    /// The drop counts as the first failed attempt of the following
    /// reconnection cycle.
    fn on_transport_lost(&mut self, reason: DisconnectReason) {
        warn!("[store-link] Connection lost: {}", reason);
        self.transport = None;
        self.reset_link_state();
        self.config.handlers.emit_disconnect(reason.clone());

        if !self.config.options.auto_reconnect {
            self.phase = Phase::Idle;
            self.set_status(ConnectionStatus {
                error: Some(reason.message),
                last_connected_at_ms: self.status.last_connected_at_ms,
                ..Default::default()
            });
            return;
        }

        let delay = self.policy.delay_for(self.attempts);
        self.set_attempts(self.attempts + 1);
        self.schedule_retry(delay, reason.message);
    }

    fn schedule_retry(&mut self, delay: std::time::Duration, error: String) {
        info!(
            "[store-link] Reconnecting in {}ms (attempt {})",
            delay.as_millis(),
            self.attempts + 1
        );
        self.phase = Phase::Waiting {
            until: deadline_after(Instant::now(), delay),
        };
        self.set_status(ConnectionStatus {
            reconnecting: true,
            error: Some(error),
            last_connected_at_ms: self.status.last_connected_at_ms,
            reconnect_attempt: self.attempts,
            retry_in_ms: Some(delay.as_millis() as u64),
            ..Default::default()
        });
    }

    fn exhaust(&mut self) {
        let err = StoreLinkError::ReconnectExhausted(self.attempts);
        warn!("[store-link] {}", err);
        self.config.handlers.emit_error(ConnectionError::from_error(&err));
        self.phase = Phase::Exhausted;
        self.set_status(ConnectionStatus {
            error: Some(RECONNECTION_FAILED.to_string()),
            last_connected_at_ms: self.status.last_connected_at_ms,
            reconnect_attempt: self.attempts,
            ..Default::default()
        });
    }

    /// Tear down the transport and any in-flight handshake. Returns whether a
    /// transport was open.
    async fn drop_link(&mut self, graceful: bool) -> bool {
        self.attempt = None;
        let was_connected = match self.transport.take() {
            Some(mut transport) => {
                if graceful {
                    let limit = self.config.timeouts.send_timeout;
                    if tokio::time::timeout(limit, transport.close()).await.is_err() {
                        debug!("[store-link] Close handshake timed out");
                    }
                }
                true
            },
            None => false,
        };
        self.reset_link_state();
        was_connected
    }

    fn reset_link_state(&mut self) {
        self.shared.connected.store(false, Ordering::SeqCst);
        self.heartbeat.stop();
        self.publish_quality();
        self.scheduler.disarm();
    }

    async fn shutdown(&mut self) {
        debug!("[store-link] Supervisor shutting down");
        self.drop_link(true).await;
        self.phase = Phase::Idle;
    }

    // ── Inbound ─────────────────────────────────────────────────────────

    async fn handle_frame(&mut self, frame: Option<Result<Frame>>) {
        match frame {
            Some(Ok(Frame::Text(text))) => self.handle_text(&text),
            Some(Ok(Frame::Binary(data))) => match String::from_utf8(data) {
                Ok(text) => self.handle_text(&text),
                Err(e) => {
                    let err = StoreLinkError::SerializationError(format!(
                        "Binary frame is not UTF-8: {}",
                        e
                    ));
                    warn!("[store-link] {}", err);
                    self.config.handlers.emit_error(ConnectionError::from_error(&err));
                },
            },
            Some(Ok(Frame::Ping(payload))) => {
                if let Err(e) = self.write_frame(Frame::Pong(payload)).await {
                    self.on_transport_lost(DisconnectReason::new(format!("Pong failed: {}", e)));
                }
            },
            Some(Ok(Frame::Pong(_))) => debug!("[store-link] Received Pong"),
            Some(Ok(Frame::Close(reason))) => {
                let reason = reason.unwrap_or_else(|| DisconnectReason::new("Server closed connection"));
                self.on_transport_lost(reason);
            },
            Some(Err(err)) => {
                self.config.handlers.emit_error(ConnectionError::from_error(&err));
                self.on_transport_lost(DisconnectReason::new(err.to_string()));
            },
            None => self.on_transport_lost(DisconnectReason::new("Connection stream ended")),
        }
    }

    fn handle_text(&mut self, text: &str) {
        self.config.handlers.emit_receive(text);

        let msg = match parse_server_message(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("[store-link] Failed to parse inbound frame: {}", e);
                return;
            },
        };

        match &msg.event {
            EventKind::Status => {
                debug!("[store-link] Ignoring inbound frame with reserved name 'status'");
                return;
            },
            EventKind::HeartbeatAck => {
                if self.heartbeat.on_ack(msg.echoed_timestamp()).is_some() {
                    self.publish_quality();
                }
            },
            EventKind::Session => {
                if let Some(socket_id) = msg.session_id() {
                    debug!("[store-link] Session id {}", socket_id);
                    self.set_status(ConnectionStatus {
                        socket_id: Some(socket_id),
                        ..self.status.clone()
                    });
                }
            },
            EventKind::ServerError => {
                warn!("[store-link] Server reported error: {}", msg.data);
            },
            _ => {},
        }

        let ServerMessage { event, data } = msg;
        self.shared.multiplexer.dispatch(&LinkEvent::Server {
            kind: event,
            payload: data,
        });
    }

    // ── Outbound ────────────────────────────────────────────────────────

    async fn flush(&mut self) {
        if self.transport.is_none() {
            self.scheduler.disarm();
            return;
        }

        let mut batch = self.scheduler.take_batch().into_iter();
        while let Some(msg) = batch.next() {
            let raw = match serde_json::to_string(&msg.to_client_message()) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("[store-link] Dropping unserializable '{}': {}", msg.event, e);
                    continue;
                },
            };

            if let Err(err) = self.write_text(raw).await {
                let event = msg.event.clone();
                let rest: Vec<_> = batch.collect();
                if let Some(dropped) = self.scheduler.requeue_failed(msg, rest, &err.to_string()) {
                    self.config.handlers.emit_error(ConnectionError::from_error(
                        &StoreLinkError::DispatchError(format!(
                            "'{}' dropped after {} failed attempt(s)",
                            dropped.event, dropped.attempts
                        )),
                    ));
                }
                self.on_transport_lost(DisconnectReason::new(format!(
                    "Failed to send '{}': {}",
                    event, err
                )));
                return;
            }
        }

        if !self.scheduler.is_empty() {
            self.scheduler.arm();
        }
    }

    async fn send_heartbeat(&mut self) {
        let timestamp = now_ms();
        let raw = match serde_json::to_string(&ClientMessage::heartbeat(timestamp)) {
            Ok(raw) => raw,
            Err(e) => {
                error!("[store-link] Failed to encode heartbeat: {}", e);
                return;
            },
        };

        match self.write_text(raw).await {
            Ok(()) => {
                self.heartbeat.on_ping_sent(timestamp);
                self.publish_quality();
            },
            Err(err) => {
                self.on_transport_lost(DisconnectReason::new(format!("Heartbeat failed: {}", err)));
            },
        }
    }

    fn on_heartbeat_timeout(&mut self) {
        let err = StoreLinkError::LinkDegraded(format!(
            "no heartbeat:ack within {:?}",
            self.config.timeouts.heartbeat_timeout
        ));
        warn!("[store-link] {}", err);
        self.heartbeat.on_timeout();
        self.publish_quality();
    }

    async fn write_text(&mut self, raw: String) -> Result<()> {
        self.write_frame(Frame::Text(raw.clone())).await?;
        self.config.handlers.emit_send(&raw);
        Ok(())
    }

    async fn write_frame(&mut self, frame: Frame) -> Result<()> {
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| StoreLinkError::TransportError("not connected".to_string()))?;

        let limit = self.config.timeouts.send_timeout;
        if StoreLinkTimeouts::is_no_timeout(limit) {
            return transport.send_frame(frame).await;
        }
        match tokio::time::timeout(limit, transport.send_frame(frame)).await {
            Ok(result) => result,
            Err(_) => Err(StoreLinkError::TimeoutError(format!("Send timed out after {:?}", limit))),
        }
    }

    // ── Published state ─────────────────────────────────────────────────

    fn set_attempts(&mut self, attempts: u32) {
        self.attempts = attempts;
        self.shared.reconnect_attempts.store(attempts, Ordering::SeqCst);
    }

    /// Publish a status transition. Repeats of the current status are
    /// suppressed.
    fn set_status(&mut self, status: ConnectionStatus) {
        if status == self.status {
            return;
        }
        debug!("[store-link] Status: {}", status);
        self.status = status.clone();
        self.shared.status_tx.send_replace(status.clone());
        self.shared.multiplexer.dispatch(&LinkEvent::Status(status));
    }

    fn publish_quality(&self) {
        let quality = self.heartbeat.quality();
        self.shared.quality_tx.send_if_modified(|current| {
            if *current == quality {
                false
            } else {
                *current = quality;
                true
            }
        });
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn recv_environment(
    rx: &mut Option<mpsc::UnboundedReceiver<EnvironmentSignal>>,
) -> Option<EnvironmentSignal> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn poll_attempt(attempt: &mut Option<AttemptFuture>) -> Result<Box<dyn Transport>> {
    match attempt {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

async fn next_frame(transport: &mut Option<Box<dyn Transport>>) -> Option<Result<Frame>> {
    match transport {
        Some(transport) => transport.next_frame().await,
        None => std::future::pending().await,
    }
}
