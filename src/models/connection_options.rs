use serde::{Deserialize, Serialize};

/// Connection-level options for the store-link client.
///
/// These options control:
/// - Automatic reconnection on connection loss
/// - Reconnection timing, jitter and retry limits
/// - Outbound batching (flush interval, batch size, flush threshold)
/// - Replay of active topic subscriptions after a reconnect
///
/// # Example
///
/// ```rust
/// use store_link::ConnectionOptions;
///
/// let options = ConnectionOptions::default()
///     .with_auto_reconnect(true)
///     .with_reconnect_delay_ms(2000)
///     .with_max_reconnect_attempts(Some(10));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// Enable automatic reconnection on connection loss
    /// Default: true
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,

    /// Base delay in milliseconds for the exponential backoff
    /// Default: 1000ms
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Cap for the exponential backoff (before jitter)
    /// Default: 30000ms
    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,

    /// Maximum number of consecutive failed attempts before giving up
    /// Default: Some(10). None retries forever.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: Option<u32>,

    /// Upper bound of the random fraction added to each backoff delay
    /// Default: 0.3 (a delay grows by up to 30%)
    #[serde(default = "default_reconnect_jitter")]
    pub reconnect_jitter: f64,

    /// Interval of the outbound batch flush
    /// Default: 50ms
    #[serde(default = "default_batch_interval_ms")]
    pub batch_interval_ms: u64,

    /// Maximum number of messages written per flush
    /// Default: 10
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Queue length that triggers an immediate flush
    /// Default: 10
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,

    /// Number of failed writes after which a single message is discarded
    /// Default: 5
    #[serde(default = "default_max_dispatch_attempts")]
    pub max_dispatch_attempts: u32,

    /// Re-send the control message of every active topic subscription after
    /// each successful connect.
    /// Default: true
    #[serde(default = "default_resubscribe_on_reconnect")]
    pub resubscribe_on_reconnect: bool,
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_max_reconnect_delay_ms() -> u64 {
    30000
}

fn default_max_reconnect_attempts() -> Option<u32> {
    Some(10)
}

fn default_reconnect_jitter() -> f64 {
    0.3
}

fn default_batch_interval_ms() -> u64 {
    50
}

fn default_batch_size() -> usize {
    10
}

fn default_flush_threshold() -> usize {
    10
}

fn default_max_dispatch_attempts() -> u32 {
    5
}

fn default_resubscribe_on_reconnect() -> bool {
    true
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            auto_reconnect: default_auto_reconnect(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_delay_ms: default_max_reconnect_delay_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_jitter: default_reconnect_jitter(),
            batch_interval_ms: default_batch_interval_ms(),
            batch_size: default_batch_size(),
            flush_threshold: default_flush_threshold(),
            max_dispatch_attempts: default_max_dispatch_attempts(),
            resubscribe_on_reconnect: default_resubscribe_on_reconnect(),
        }
    }
}

impl ConnectionOptions {
    /// Create new connection options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether to automatically reconnect on connection loss
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Set the base backoff delay (in milliseconds)
    pub fn with_reconnect_delay_ms(mut self, delay_ms: u64) -> Self {
        self.reconnect_delay_ms = delay_ms;
        self
    }

    /// Set the backoff cap (in milliseconds)
    pub fn with_max_reconnect_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_reconnect_delay_ms = max_delay_ms;
        self
    }

    /// Set the maximum number of reconnection attempts
    /// Pass None for infinite retries
    pub fn with_max_reconnect_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_reconnect_attempts = max_attempts;
        self
    }

    /// Set the jitter fraction (clamped to `0.0..=1.0` when the policy is built;
    /// a non-finite value disables jitter)
    pub fn with_reconnect_jitter(mut self, jitter: f64) -> Self {
        self.reconnect_jitter = jitter;
        self
    }

    /// Set the outbound flush interval (in milliseconds)
    pub fn with_batch_interval_ms(mut self, interval_ms: u64) -> Self {
        self.batch_interval_ms = interval_ms;
        self
    }

    /// Set the number of messages written per flush
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Set the queue length that forces an immediate flush
    pub fn with_flush_threshold(mut self, threshold: usize) -> Self {
        self.flush_threshold = threshold;
        self
    }

    /// Set how many failed writes a single message survives
    pub fn with_max_dispatch_attempts(mut self, attempts: u32) -> Self {
        self.max_dispatch_attempts = attempts;
        self
    }

    /// Enable or disable replay of active topic subscriptions on connect
    pub fn with_resubscribe_on_reconnect(mut self, enabled: bool) -> Self {
        self.resubscribe_on_reconnect = enabled;
        self
    }
}
