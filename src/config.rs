//! Process configuration, read from the environment at startup.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_PORT: u16 = 10000;
pub const DEFAULT_PING_INTERVAL_SECS: u64 = 25;
pub const DEFAULT_PING_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 25;
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_CORS_ORIGINS: &str = "*";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("POLL_TIMEOUT_SECS must be shorter than SESSION_TIMEOUT_SECS")]
    PollOutlivesSession,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    /// WebSocket ping cadence.
    pub ping_interval: Duration,
    /// How long to wait for a Pong before dropping the connection.
    pub ping_timeout: Duration,
    /// How long a long-poll request waits for outbound events.
    pub poll_timeout: Duration,
    /// Idle time after which a polling session counts as disconnected.
    pub session_timeout: Duration,
    /// Comma-separated allowed origins, or `*`.
    pub cors_origins: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            ping_interval: Duration::from_secs(DEFAULT_PING_INTERVAL_SECS),
            ping_timeout: Duration::from_secs(DEFAULT_PING_TIMEOUT_SECS),
            poll_timeout: Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECS),
            session_timeout: Duration::from_secs(DEFAULT_SESSION_TIMEOUT_SECS),
            cors_origins: DEFAULT_CORS_ORIGINS.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup; unset keys take defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            port: parse_or(&lookup, "PORT", defaults.port)?,
            ping_interval: secs_or(&lookup, "PING_INTERVAL_SECS", defaults.ping_interval)?,
            ping_timeout: secs_or(&lookup, "PING_TIMEOUT_SECS", defaults.ping_timeout)?,
            poll_timeout: secs_or(&lookup, "POLL_TIMEOUT_SECS", defaults.poll_timeout)?,
            session_timeout: secs_or(&lookup, "SESSION_TIMEOUT_SECS", defaults.session_timeout)?,
            cors_origins: lookup("CORS_ORIGINS")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.cors_origins),
        };

        if config.poll_timeout >= config.session_timeout {
            return Err(ConfigError::PollOutlivesSession);
        }
        Ok(config)
    }

    /// Listen address. Always all interfaces.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key,
            value: raw.clone(),
        }),
        None => Ok(default),
    }
}

fn secs_or<F>(lookup: &F, key: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let secs: u64 = parse_or(lookup, key, default.as_secs())?;
    if secs == 0 {
        return Err(ConfigError::ZeroDuration(key));
    }
    Ok(Duration::from_secs(secs))
}
