//! Server configuration module
//! Handles dynamic configuration parameters for the relay

use crate::constants::{
    DEFAULT_HISTORY_CAPACITY, DEFAULT_HOST, DEFAULT_PORT, KEEPALIVE_INTERVAL_SECS,
    MAX_FRAME_SIZE, OUTBOUND_QUEUE_CAPACITY, READ_IDLE_TIMEOUT_SECS, WRITE_TIMEOUT_SECS,
};
use crate::error::{RelayError, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Per-connection parameters shared by the accept handler and the pumps
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Connection is reaped when no pong arrives within this window
    pub read_idle_timeout: Duration,
    /// Upper bound for a single write (or coalesced batch)
    pub write_timeout: Duration,
    /// Ping period, strictly below `read_idle_timeout`
    pub keepalive_interval: Duration,
    pub max_frame_size: usize,
    pub outbound_queue_capacity: usize,
    /// Broadcast user_joined / user_left when connections come and go
    pub announce_presence: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            read_idle_timeout: Duration::from_secs(READ_IDLE_TIMEOUT_SECS),
            write_timeout: Duration::from_secs(WRITE_TIMEOUT_SECS),
            keepalive_interval: Duration::from_secs(KEEPALIVE_INTERVAL_SECS),
            max_frame_size: MAX_FRAME_SIZE,
            outbound_queue_capacity: OUTBOUND_QUEUE_CAPACITY,
            announce_presence: true,
        }
    }
}

impl ConnectionSettings {
    pub fn validate(&self) -> Result<()> {
        if self.keepalive_interval >= self.read_idle_timeout {
            return Err(RelayError::ConfigError(format!(
                "keepalive interval ({:?}) must be shorter than the read idle timeout ({:?})",
                self.keepalive_interval, self.read_idle_timeout
            )));
        }
        if self.keepalive_interval.is_zero() || self.write_timeout.is_zero() {
            return Err(RelayError::ConfigError(
                "keepalive interval and write timeout must be non-zero".to_string(),
            ));
        }
        if self.outbound_queue_capacity == 0 {
            return Err(RelayError::ConfigError(
                "outbound queue capacity must be at least 1".to_string(),
            ));
        }
        if self.max_frame_size == 0 {
            return Err(RelayError::ConfigError(
                "maximum frame size must be at least 1 byte".to_string(),
            ));
        }
        Ok(())
    }
}

/// Server configuration parameters
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    /// JWT secret for token validation
    pub jwt_secret: String,
    /// Capacity of the in-memory message store
    pub history_capacity: usize,
    pub connection: ConnectionSettings,
}

impl RelayConfig {
    /// Build a configuration with default settings around a secret
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            jwt_secret: jwt_secret.into(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            connection: ConnectionSettings::default(),
        }
    }

    /// Validate that a secret meets security requirements
    fn validate_secret(secret: &str) -> Result<()> {
        if secret.is_empty() {
            return Err(RelayError::ConfigError("JWT_SECRET must be set".to_string()));
        }

        // Placeholder values shipped in sample env files
        let insecure_patterns = ["your-secret-key", "change-in-production", "change-this"];
        for pattern in &insecure_patterns {
            if secret.contains(pattern) {
                return Err(RelayError::ConfigError(format!(
                    "JWT secret contains placeholder pattern '{}'. Generate one with: openssl rand -base64 32",
                    pattern
                )));
            }
        }

        if secret.len() < 16 {
            return Err(RelayError::ConfigError(
                "JWT secret must be at least 16 characters long".to_string(),
            ));
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        Self::validate_secret(&self.jwt_secret)?;
        self.connection.validate()
    }

    /// Load configuration from environment variables if available
    pub fn from_env() -> Result<Self> {
        let host = env::var("RUSTY_RELAY_HOST").unwrap_or(DEFAULT_HOST.to_string());
        let port = parse_var("RUSTY_RELAY_PORT")
            .or_else(|| parse_var("PORT"))
            .unwrap_or(DEFAULT_PORT);

        let jwt_secret = env::var("RUSTY_RELAY_JWT_SECRET")
            .or_else(|_| env::var("JWT_SECRET"))
            .map_err(|_| {
                RelayError::ConfigError(
                    "JWT_SECRET environment variable is required. \
                     Generate one with: openssl rand -base64 32"
                        .to_string(),
                )
            })?;

        let read_idle_secs =
            parse_var("RUSTY_RELAY_READ_IDLE_SECS").unwrap_or(READ_IDLE_TIMEOUT_SECS);
        let write_secs = parse_var("RUSTY_RELAY_WRITE_TIMEOUT_SECS").unwrap_or(WRITE_TIMEOUT_SECS);
        // Follow the read idle window unless set explicitly
        let ping_secs = parse_var("RUSTY_RELAY_PING_SECS").unwrap_or(read_idle_secs * 9 / 10);

        let connection = ConnectionSettings {
            read_idle_timeout: Duration::from_secs(read_idle_secs),
            write_timeout: Duration::from_secs(write_secs),
            keepalive_interval: Duration::from_secs(ping_secs),
            max_frame_size: parse_var("RUSTY_RELAY_MAX_FRAME_BYTES").unwrap_or(MAX_FRAME_SIZE),
            outbound_queue_capacity: parse_var("RUSTY_RELAY_QUEUE_CAPACITY")
                .unwrap_or(OUTBOUND_QUEUE_CAPACITY),
            announce_presence: env::var("RUSTY_RELAY_ANNOUNCE_PRESENCE")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(true),
        };

        let config = Self {
            host,
            port,
            jwt_secret,
            history_capacity: parse_var("RUSTY_RELAY_HISTORY_CAPACITY")
                .unwrap_or(DEFAULT_HISTORY_CAPACITY),
            connection,
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_var<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}
