//! Real-time channel configuration.
//!
//! [`ChannelConfig`] carries the notification server endpoint and the
//! reconnect policy. Binaries load it with [`ChannelConfig::from_env`];
//! values are checked with `validator` before use.

use std::time::Duration;

use validator::Validate;

use crate::reconnect::ReconnectConfig;

/// Default number of reconnection attempts after a dropped connection.
const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;
/// Default fixed delay between reconnection attempts, in milliseconds.
const DEFAULT_RECONNECT_DELAY_MS: u64 = 1000;

/// Real-time channel configuration.
#[derive(Debug, Clone, Validate)]
pub struct ChannelConfig {
    /// WebSocket endpoint of the notification server, e.g. `ws://host:5000/ws`.
    #[validate(url)]
    pub ws_url: String,
    /// How many times to retry after the connection drops.
    #[validate(range(max = 50))]
    pub reconnect_attempts: u32,
    /// Fixed delay before each retry.
    #[validate(range(min = 10, max = 60_000))]
    pub reconnect_delay_ms: u64,
}

/// Errors raised while loading [`ChannelConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} must be a valid integer, got '{value}'")]
    NotANumber { var: &'static str, value: String },

    #[error("Invalid real-time configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

impl ChannelConfig {
    /// Configuration for `ws_url` with the default reconnect policy.
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// | Env Var                       | Required | Default |
    /// |-------------------------------|----------|---------|
    /// | `REALTIME_WS_URL`             | **yes**  | --      |
    /// | `REALTIME_RECONNECT_ATTEMPTS` | no       | `5`     |
    /// | `REALTIME_RECONNECT_DELAY_MS` | no       | `1000`  |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let ws_url = lookup("REALTIME_WS_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("REALTIME_WS_URL"))?;

        let reconnect_attempts = parse_or(
            &lookup,
            "REALTIME_RECONNECT_ATTEMPTS",
            DEFAULT_RECONNECT_ATTEMPTS,
        )?;
        let reconnect_delay_ms = parse_or(
            &lookup,
            "REALTIME_RECONNECT_DELAY_MS",
            DEFAULT_RECONNECT_DELAY_MS,
        )?;

        let config = Self {
            ws_url,
            reconnect_attempts,
            reconnect_delay_ms,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn reconnect(&self) -> ReconnectConfig {
        ReconnectConfig {
            max_attempts: self.reconnect_attempts,
            delay: Duration::from_millis(self.reconnect_delay_ms),
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::NotANumber { var, value }),
        None => Ok(default),
    }
}
