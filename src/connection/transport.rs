//! Transport seam between the supervisor and the network.
//!
//! The supervisor only sees [`Connector`] and [`Transport`]. [`WsConnector`]
//! is the production implementation on top of `tokio-tungstenite`; tests
//! plug in in-memory doubles.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use log::debug;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        error::Error as WsError,
        http::header::{HeaderValue, AUTHORIZATION},
        protocol::Message,
    },
    MaybeTlsStream, WebSocketStream,
};

use crate::error::{Result, StoreLinkError};
use crate::event_handlers::DisconnectReason;

/// One transport-level frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close(Option<DisconnectReason>),
}

/// Everything needed to open a connection.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Resolved `ws://` or `wss://` URL.
    pub url: String,
    /// Bearer credential sent on the upgrade request.
    pub bearer_token: Option<String>,
}

impl std::fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectRequest")
            .field("url", &self.url)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// An open, bidirectional frame stream.
///
/// `next_frame` must be cancel safe: the supervisor polls it inside
/// `tokio::select!`.
#[async_trait]
pub trait Transport: Send {
    async fn send_frame(&mut self, frame: Frame) -> Result<()>;

    /// Next inbound frame. `None` once the stream ended.
    async fn next_frame(&mut self) -> Option<Result<Frame>>;

    async fn close(&mut self);
}

/// Opens transports.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, request: &ConnectRequest) -> Result<Box<dyn Transport>>;
}

/// WebSocket connector backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, request: &ConnectRequest) -> Result<Box<dyn Transport>> {
        debug!("[store-link] Establishing WebSocket connection to {}", request.url);

        let mut ws_request = request.url.as_str().into_client_request().map_err(|e| {
            StoreLinkError::ConfigurationError(format!("Failed to build WebSocket request: {}", e))
        })?;

        if let Some(token) = &request.bearer_token {
            let header_value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e| {
                StoreLinkError::ConfigurationError(format!(
                    "Invalid token for Authorization header: {}",
                    e
                ))
            })?;
            ws_request.headers_mut().insert(AUTHORIZATION, header_value);
        }

        match connect_async(ws_request).await {
            Ok((stream, _response)) => Ok(Box::new(WsTransport { stream })),
            Err(WsError::Http(response)) => {
                let status = response.status().as_u16();
                let message = match status {
                    401 => "Unauthorized: WebSocket requires valid credentials".to_string(),
                    403 => "Forbidden: Access to WebSocket denied".to_string(),
                    code => {
                        let body = response
                            .body()
                            .as_ref()
                            .filter(|b| !b.is_empty())
                            .map(|b| String::from_utf8_lossy(b).into_owned());
                        match body {
                            Some(body) => format!("WebSocket HTTP error {}: {}", code, body),
                            None => format!("WebSocket HTTP error: {}", code),
                        }
                    },
                };
                Err(StoreLinkError::TransportError(message))
            },
            Err(e) => Err(StoreLinkError::TransportError(format!("Connection failed: {}", e))),
        }
    }
}

struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send_frame(&mut self, frame: Frame) -> Result<()> {
        let message = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(data) => Message::Binary(data.into()),
            Frame::Ping(data) => Message::Ping(data.into()),
            Frame::Pong(data) => Message::Pong(data.into()),
            Frame::Close(_) => Message::Close(None),
        };
        self.stream.send(message).await?;
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Result<Frame>> {
        loop {
            let frame = match self.stream.next().await? {
                Ok(Message::Text(text)) => Frame::Text(text.to_string()),
                Ok(Message::Binary(data)) => Frame::Binary(data.to_vec()),
                Ok(Message::Ping(data)) => Frame::Ping(data.to_vec()),
                Ok(Message::Pong(data)) => Frame::Pong(data.to_vec()),
                Ok(Message::Close(close)) => Frame::Close(close.map(|f| {
                    DisconnectReason::with_code(f.reason.to_string(), f.code.into())
                })),
                Ok(Message::Frame(_)) => continue,
                Err(e) => return Some(Err(e.into())),
            };
            return Some(Ok(frame));
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("[store-link] Error while closing WebSocket: {}", e);
        }
    }
}
