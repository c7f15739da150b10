#![allow(dead_code)]

//! Shared test doubles: a scripted in-memory connector, the server side of
//! each accepted connection, and a `log` capture.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::Instant;

use store_link::{
    ConnectRequest, ConnectionOptions, ConnectionStatus, Connector, DisconnectReason,
    EnvironmentSource, Frame, Result, StoreLinkClient, StoreLinkError, StoreLinkTimeouts,
    Transport,
};

/// Upper bound for any wait in virtual time.
pub const WAIT: Duration = Duration::from_secs(120);

/// Scripted result of one connection attempt.
#[derive(Debug, Clone)]
pub enum Outcome {
    Accept,
    Fail(String),
    /// Never completes; only the handshake timeout ends it.
    Hang,
}

/// In-memory connector. Attempts consume the script front to back and accept
/// once it is empty.
#[derive(Clone)]
pub struct MockConnector {
    script: Arc<Mutex<VecDeque<Outcome>>>,
    attempts: Arc<Mutex<Vec<Instant>>>,
    requests: Arc<Mutex<Vec<ConnectRequest>>>,
    servers: mpsc::UnboundedSender<MockServer>,
}

impl MockConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockServer>) {
        let (servers, rx) = mpsc::unbounded_channel();
        let connector = Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            attempts: Arc::new(Mutex::new(Vec::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            servers,
        };
        (connector, rx)
    }

    pub fn scripted(outcomes: impl IntoIterator<Item = Outcome>) -> (Self, mpsc::UnboundedReceiver<MockServer>) {
        let (connector, rx) = Self::new();
        connector.script.lock().extend(outcomes);
        (connector, rx)
    }

    /// Append an outcome for a later attempt.
    pub fn push_outcome(&self, outcome: Outcome) {
        self.script.lock().push_back(outcome);
    }

    pub fn connect_count(&self) -> usize {
        self.attempts.lock().len()
    }

    /// Virtual instants at which attempts started.
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().clone()
    }

    pub fn requests(&self) -> Vec<ConnectRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, request: &ConnectRequest) -> Result<Box<dyn Transport>> {
        self.attempts.lock().push(Instant::now());
        self.requests.lock().push(request.clone());

        let outcome = self.script.lock().pop_front().unwrap_or(Outcome::Accept);
        match outcome {
            Outcome::Accept => {
                let (transport, server) = MockTransport::pair();
                let _ = self.servers.send(server);
                Ok(Box::new(transport))
            },
            Outcome::Fail(message) => Err(StoreLinkError::TransportError(message)),
            Outcome::Hang => std::future::pending().await,
        }
    }
}

struct MockTransport {
    inbound: mpsc::UnboundedReceiver<Frame>,
    outbound: mpsc::UnboundedSender<Frame>,
    fail_sends: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl MockTransport {
    fn pair() -> (Self, MockServer) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let fail_sends = Arc::new(AtomicBool::new(false));
        let closed = Arc::new(AtomicBool::new(false));

        let transport = Self {
            inbound: inbound_rx,
            outbound: outbound_tx,
            fail_sends: Arc::clone(&fail_sends),
            closed: Arc::clone(&closed),
        };
        let server = MockServer {
            outbound: outbound_rx,
            inbound: Some(inbound_tx),
            fail_sends,
            closed,
        };
        (transport, server)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_frame(&mut self, frame: Frame) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(StoreLinkError::TransportError("broken pipe".to_string()));
        }
        let _ = self.outbound.send(frame);
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Result<Frame>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Server side of one accepted connection.
pub struct MockServer {
    outbound: mpsc::UnboundedReceiver<Frame>,
    inbound: Option<mpsc::UnboundedSender<Frame>>,
    fail_sends: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl MockServer {
    /// Next frame written by the client. `None` once the client dropped the
    /// transport or nothing arrived within [`WAIT`].
    pub async fn recv_frame(&mut self) -> Option<Frame> {
        tokio::time::timeout(WAIT, self.outbound.recv()).await.ok().flatten()
    }

    /// Next text frame, decoded.
    pub async fn recv_message(&mut self) -> Option<Value> {
        loop {
            match self.recv_frame().await? {
                Frame::Text(text) => return serde_json::from_str(&text).ok(),
                _ => continue,
            }
        }
    }

    /// Next non-heartbeat message.
    pub async fn recv_app_message(&mut self) -> Option<Value> {
        loop {
            let msg = self.recv_message().await?;
            if msg["event"] != "heartbeat" {
                return Some(msg);
            }
        }
    }

    pub fn emit(&self, event: &str, data: Value) {
        self.send_frame(Frame::Text(json!({ "event": event, "data": data }).to_string()));
    }

    pub fn send_frame(&self, frame: Frame) {
        if let Some(tx) = &self.inbound {
            let _ = tx.send(frame);
        }
    }

    /// Close from the server side.
    pub fn close(&self, reason: &str) {
        self.send_frame(Frame::Close(Some(DisconnectReason::with_code(reason, 1012))));
    }

    /// Make every following client write fail.
    pub fn break_writes(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Whether the client performed a close handshake.
    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Client wired to `connector`, with heartbeats disabled unless `timeouts`
/// says otherwise.
pub fn client_with(
    connector: &MockConnector,
    options: ConnectionOptions,
    timeouts: StoreLinkTimeouts,
    environment: Option<EnvironmentSource>,
) -> StoreLinkClient {
    let mut builder = StoreLinkClient::builder()
        .url("http://shop.test/realtime")
        .bearer_token("test-token")
        .connector(connector.clone())
        .connection_options(options)
        .timeouts(timeouts);
    if let Some(source) = environment {
        builder = builder.environment(source);
    }
    builder.build().unwrap()
}

pub fn quiet_client(connector: &MockConnector) -> StoreLinkClient {
    client_with(
        connector,
        ConnectionOptions::default(),
        StoreLinkTimeouts::for_testing(0),
        None,
    )
}

pub async fn next_server(servers: &mut mpsc::UnboundedReceiver<MockServer>) -> MockServer {
    tokio::time::timeout(WAIT, servers.recv())
        .await
        .expect("no connection accepted in time")
        .expect("connector dropped")
}

/// Wait until the published status satisfies `pred`.
pub async fn wait_status<F>(client: &StoreLinkClient, pred: F) -> ConnectionStatus
where
    F: FnMut(&ConnectionStatus) -> bool,
{
    let mut rx = client.status_receiver();
    let status = tokio::time::timeout(WAIT, rx.wait_for(pred))
        .await
        .expect("status not reached in time")
        .expect("supervisor stopped");
    status.clone()
}

pub async fn wait_connected(client: &StoreLinkClient) -> ConnectionStatus {
    wait_status(client, |s| s.connected).await
}

/// Collect every status transition dispatched to listeners.
pub fn record_statuses(client: &StoreLinkClient) -> Arc<Mutex<Vec<ConnectionStatus>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    client.on_status(move |status| sink.lock().push(status.clone()));
    seen
}

/// Let the supervisor drain its command queue.
pub async fn settle(client: &StoreLinkClient) {
    let _ = client.pending_messages().await;
}

// ── log capture ─────────────────────────────────────────────────────────

struct CaptureLogger;

static RECORDS: OnceLock<Mutex<Vec<(log::Level, String)>>> = OnceLock::new();
static LOGGER: CaptureLogger = CaptureLogger;

impl log::Log for CaptureLogger {
    fn enabled(&self, _: &log::Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &log::Record<'_>) {
        RECORDS
            .get_or_init(|| Mutex::new(Vec::new()))
            .lock()
            .push((record.level(), record.args().to_string()));
    }

    fn flush(&self) {}
}

pub fn init_log_capture() {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(log::LevelFilter::Debug);
        }
    });
}

/// Whether a record at `level` containing `needle` was logged.
pub fn logged(level: log::Level, needle: &str) -> bool {
    RECORDS
        .get_or_init(|| Mutex::new(Vec::new()))
        .lock()
        .iter()
        .any(|(lvl, msg)| *lvl == level && msg.contains(needle))
}
