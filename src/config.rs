//! File-based client configuration.
//!
//! ```toml
//! url = "https://api.shop.example/realtime"
//!
//! [connection]
//! reconnect_delay_ms = 1000
//! max_reconnect_attempts = 10
//! batch_interval_ms = 50
//!
//! [timeouts]
//! heartbeat_interval_ms = 25000
//!
//! [logging]
//! level = "info"
//! format = "compact"
//! ```
//!
//! Every section is optional. Environment overrides are applied separately
//! with [`StoreLinkConfig::apply_env_overrides`].

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connection::resolve_ws_url;
use crate::error::{Result, StoreLinkError};
use crate::models::ConnectionOptions;
use crate::timeouts::StoreLinkTimeouts;

const VALID_LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
const VALID_LOG_FORMATS: [&str; 3] = ["compact", "pretty", "json"];

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreLinkConfig {
    /// Backend endpoint (`http(s)://` or `ws(s)://`).
    pub url: String,

    /// Environment variable holding the bearer token.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    #[serde(default)]
    pub connection: ConnectionOptions,

    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Timeouts in milliseconds, as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// 0 disables heartbeats.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `compact`, `pretty` or `json`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_token_env() -> String {
    "STORE_LINK_TOKEN".to_string()
}

fn default_handshake_timeout_ms() -> u64 {
    10_000
}

fn default_send_timeout_ms() -> u64 {
    10_000
}

fn default_heartbeat_interval_ms() -> u64 {
    25_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: default_handshake_timeout_ms(),
            send_timeout_ms: default_send_timeout_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
        }
    }
}

impl TimeoutsConfig {
    pub fn to_timeouts(&self) -> StoreLinkTimeouts {
        StoreLinkTimeouts::builder()
            .handshake_timeout(Duration::from_millis(self.handshake_timeout_ms))
            .send_timeout(Duration::from_millis(self.send_timeout_ms))
            .heartbeat_interval(Duration::from_millis(self.heartbeat_interval_ms))
            .heartbeat_timeout(Duration::from_millis(self.heartbeat_timeout_ms))
            .build()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl StoreLinkConfig {
    /// Configuration with defaults for everything but the endpoint.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token_env: default_token_env(),
            connection: ConnectionOptions::default(),
            timeouts: TimeoutsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load and validate a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: StoreLinkConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// - `STORE_LINK_URL`: `url`
    /// - `STORE_LINK_TOKEN_ENV`: `token_env`
    /// - `STORE_LINK_AUTO_RECONNECT`: `connection.auto_reconnect`
    /// - `STORE_LINK_MAX_RECONNECT_ATTEMPTS`: a number, or `unlimited`
    /// - `STORE_LINK_HEARTBEAT_INTERVAL_MS`: `timeouts.heartbeat_interval_ms`
    /// - `STORE_LINK_LOG_LEVEL`: `logging.level`
    /// - `STORE_LINK_LOG_FORMAT`: `logging.format`
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(url) = env::var("STORE_LINK_URL") {
            self.url = url;
        }

        if let Ok(var) = env::var("STORE_LINK_TOKEN_ENV") {
            self.token_env = var;
        }

        if let Ok(val) = env::var("STORE_LINK_AUTO_RECONNECT") {
            self.connection.auto_reconnect = parse_bool("STORE_LINK_AUTO_RECONNECT", &val)?;
        }

        if let Ok(val) = env::var("STORE_LINK_MAX_RECONNECT_ATTEMPTS") {
            self.connection.max_reconnect_attempts = if val.eq_ignore_ascii_case("unlimited") {
                None
            } else {
                Some(val.parse().map_err(|_| {
                    StoreLinkError::ConfigurationError(format!(
                        "Invalid STORE_LINK_MAX_RECONNECT_ATTEMPTS value: {}",
                        val
                    ))
                })?)
            };
        }

        if let Ok(val) = env::var("STORE_LINK_HEARTBEAT_INTERVAL_MS") {
            self.timeouts.heartbeat_interval_ms = val.parse().map_err(|_| {
                StoreLinkError::ConfigurationError(format!(
                    "Invalid STORE_LINK_HEARTBEAT_INTERVAL_MS value: {}",
                    val
                ))
            })?;
        }

        if let Ok(level) = env::var("STORE_LINK_LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }

        if let Ok(format) = env::var("STORE_LINK_LOG_FORMAT") {
            self.logging.format = format.to_lowercase();
        }

        Ok(())
    }

    /// Validate configuration settings.
    pub fn validate(&self) -> Result<()> {
        resolve_ws_url(&self.url)?;

        let conn = &self.connection;
        if conn.reconnect_delay_ms == 0 {
            return Err(config_error("reconnect_delay_ms cannot be 0"));
        }
        if conn.max_reconnect_delay_ms < conn.reconnect_delay_ms {
            return Err(config_error(format!(
                "max_reconnect_delay_ms ({}) cannot be lower than reconnect_delay_ms ({})",
                conn.max_reconnect_delay_ms, conn.reconnect_delay_ms
            )));
        }
        if !(0.0..=1.0).contains(&conn.reconnect_jitter) {
            return Err(config_error(format!(
                "reconnect_jitter must be within 0.0..=1.0 (found {})",
                conn.reconnect_jitter
            )));
        }
        if conn.batch_size == 0 {
            return Err(config_error("batch_size cannot be 0"));
        }
        if conn.flush_threshold == 0 {
            return Err(config_error("flush_threshold cannot be 0"));
        }
        if conn.max_dispatch_attempts == 0 {
            return Err(config_error("max_dispatch_attempts cannot be 0"));
        }

        let timeouts = &self.timeouts;
        if timeouts.heartbeat_interval_ms > 0
            && timeouts.heartbeat_timeout_ms >= timeouts.heartbeat_interval_ms
        {
            return Err(config_error(format!(
                "heartbeat_timeout_ms ({}) must be lower than heartbeat_interval_ms ({})",
                timeouts.heartbeat_timeout_ms, timeouts.heartbeat_interval_ms
            )));
        }

        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(config_error(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            return Err(config_error(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                VALID_LOG_FORMATS.join(", ")
            )));
        }

        Ok(())
    }
}

fn config_error(message: impl Into<String>) -> StoreLinkError {
    StoreLinkError::ConfigurationError(message.into())
}

fn parse_bool(name: &str, val: &str) -> Result<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(config_error(format!("Invalid {} value: {}", name, val))),
    }
}
