//! Timeout configuration for the store-link connection.
//!
//! The handshake timeout and the heartbeat watch window are the only explicit
//! timeouts of the client; the send timeout bounds a single transport write
//! so that a stalled socket is detected as a dispatch failure.

use std::time::Duration;

/// Timeout configuration for store-link.
///
/// # Examples
///
/// ```rust
/// use store_link::StoreLinkTimeouts;
/// use std::time::Duration;
///
/// // Use defaults (recommended for most cases)
/// let timeouts = StoreLinkTimeouts::default();
///
/// // Custom timeouts for high-latency environments
/// let timeouts = StoreLinkTimeouts::builder()
///     .handshake_timeout(Duration::from_secs(30))
///     .heartbeat_interval_secs(60)
///     .build();
///
/// // Aggressive timeouts for local development
/// let timeouts = StoreLinkTimeouts::fast();
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLinkTimeouts {
    /// Timeout for establishing the WebSocket (TCP + TLS + upgrade).
    /// Default: 10 seconds
    pub handshake_timeout: Duration,

    /// Timeout for writing one frame to the transport.
    /// Default: 10 seconds
    pub send_timeout: Duration,

    /// Interval between application-level heartbeats while connected.
    /// Set to 0 to disable heartbeats.
    /// Default: 25 seconds
    pub heartbeat_interval: Duration,

    /// How long to wait for `heartbeat:ack` before the latency is reported
    /// as unknown.
    /// Default: 5 seconds
    pub heartbeat_timeout: Duration,
}

impl Default for StoreLinkTimeouts {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            send_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(25),
            heartbeat_timeout: Duration::from_secs(5),
        }
    }
}

impl StoreLinkTimeouts {
    /// Create a new builder for custom timeout configuration.
    pub fn builder() -> StoreLinkTimeoutsBuilder {
        StoreLinkTimeoutsBuilder::new()
    }

    /// Short timeouts suited to a backend on localhost.
    pub fn fast() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(2),
            send_timeout: Duration::from_secs(2),
            heartbeat_interval: Duration::from_secs(10),
            heartbeat_timeout: Duration::from_secs(2),
        }
    }

    /// Longer timeouts for high-latency or unreliable (mobile) networks.
    pub fn relaxed() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(30),
            send_timeout: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(60),
            heartbeat_timeout: Duration::from_secs(15),
        }
    }

    /// Timeouts for tests: heartbeats every `heartbeat_secs`, one second to ack.
    pub fn for_testing(heartbeat_secs: u64) -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
            send_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(heartbeat_secs),
            heartbeat_timeout: Duration::from_secs(1),
        }
    }

    /// Check if a duration represents "no timeout" (zero or very large).
    pub fn is_no_timeout(duration: Duration) -> bool {
        duration.is_zero() || duration > Duration::from_secs(86400 * 365)
    }
}

/// Builder for [`StoreLinkTimeouts`].
#[derive(Debug, Clone)]
pub struct StoreLinkTimeoutsBuilder {
    timeouts: StoreLinkTimeouts,
}

impl StoreLinkTimeoutsBuilder {
    fn new() -> Self {
        Self {
            timeouts: StoreLinkTimeouts::default(),
        }
    }

    /// Set the handshake timeout.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.handshake_timeout = timeout;
        self
    }

    /// Set the handshake timeout in seconds.
    pub fn handshake_timeout_secs(self, secs: u64) -> Self {
        self.handshake_timeout(Duration::from_secs(secs))
    }

    /// Set the per-frame send timeout.
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.send_timeout = timeout;
        self
    }

    /// Set the per-frame send timeout in seconds.
    pub fn send_timeout_secs(self, secs: u64) -> Self {
        self.send_timeout(Duration::from_secs(secs))
    }

    /// Set the heartbeat interval. Zero disables heartbeats.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.timeouts.heartbeat_interval = interval;
        self
    }

    /// Set the heartbeat interval in seconds. Zero disables heartbeats.
    pub fn heartbeat_interval_secs(self, secs: u64) -> Self {
        self.heartbeat_interval(Duration::from_secs(secs))
    }

    /// Set the heartbeat acknowledgement window.
    pub fn heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.heartbeat_timeout = timeout;
        self
    }

    /// Set the heartbeat acknowledgement window in seconds.
    pub fn heartbeat_timeout_secs(self, secs: u64) -> Self {
        self.heartbeat_timeout(Duration::from_secs(secs))
    }

    /// Build the timeout configuration.
    pub fn build(self) -> StoreLinkTimeouts {
        self.timeouts
    }
}
