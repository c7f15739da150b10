//! Connection management: the supervisor task, the transport seam and the
//! heartbeat cycle.

pub(crate) mod heartbeat;
pub(crate) mod supervisor;
pub mod transport;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::Instant;
use url::Url;

use crate::error::{Result, StoreLinkError};
use crate::models::ServerMessage;

/// Milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Roughly 30 years; deadlines that would overflow `Instant` land here.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `from + delay` without overflowing on huge configured delays.
pub(crate) fn deadline_after(from: Instant, delay: Duration) -> Instant {
    from.checked_add(delay)
        .or_else(|| from.checked_add(FAR_FUTURE))
        .unwrap_or(from)
}

/// Normalize the configured endpoint into a WebSocket URL.
///
/// `http`/`https` map to `ws`/`wss`. The path is kept, the fragment dropped.
pub fn resolve_ws_url(raw: &str) -> Result<String> {
    let mut url = Url::parse(raw.trim()).map_err(|e| {
        StoreLinkError::ConfigurationError(format!("Invalid URL '{}': {}", raw, e))
    })?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(StoreLinkError::ConfigurationError(format!(
                "Unsupported URL scheme '{}'; expected http(s) or ws(s)",
                other
            )));
        },
    };

    if url.host_str().is_none() {
        return Err(StoreLinkError::ConfigurationError(format!(
            "URL '{}' must include a host",
            raw
        )));
    }

    if !url.username().is_empty() || url.password().is_some() {
        return Err(StoreLinkError::ConfigurationError(
            "URL must not include username/password credentials".to_string(),
        ));
    }

    url.set_scheme(scheme).map_err(|_| {
        StoreLinkError::ConfigurationError("Failed to set WebSocket URL scheme".to_string())
    })?;
    url.set_fragment(None);

    Ok(url.to_string())
}

/// Decode one inbound JSON frame.
pub(crate) fn parse_server_message(text: &str) -> Result<ServerMessage> {
    Ok(serde_json::from_str(text)?)
}
