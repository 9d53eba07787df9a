use std::{env, str::FromStr, time::Duration};

use varcache_core::connection::BackoffPolicy;

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Redis host (default: "127.0.0.1")
    pub redis_host: String,
    /// Redis port (default: 6379)
    pub redis_port: u16,
    /// Redis password, empty when the server requires none (default: "")
    pub redis_password: String,
    /// Redis database index (default: 0)
    pub redis_db: i64,
    /// Seconds between heartbeat writes (default: 60)
    pub heartbeat_interval_seconds: u64,
    /// First reconnect backoff step in milliseconds (default: 100)
    pub reconnect_base_delay_ms: u64,
    /// Reconnect backoff cap in milliseconds (default: 30,000)
    pub reconnect_max_delay_ms: u64,
    /// Fraction of each backoff delay that is randomized (default: 0.5)
    pub reconnect_jitter: f64,
    /// TCP connect timeout in milliseconds (default: 5,000)
    pub connect_timeout_ms: u64,
    /// Per-request response timeout in milliseconds (default: 5,000)
    pub response_timeout_ms: u64,
    /// Wait for the server to finish loading before using a connection (default: true)
    pub ready_check: bool,
    /// Maximum entries held by the in-memory store (default: 10,000)
    pub cache_max_entries: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `REDIS_HOST` - Redis host (default: "127.0.0.1")
    /// - `REDIS_PORT` - Redis port (default: 6379)
    /// - `REDIS_PASSWORD` - Redis password (default: empty)
    /// - `REDIS_DB` - Redis database index (default: 0)
    /// - `HEARTBEAT_INTERVAL_SECONDS` - Heartbeat period (default: 60)
    /// - `RECONNECT_BASE_DELAY_MS` - Backoff base (default: 100)
    /// - `RECONNECT_MAX_DELAY_MS` - Backoff cap (default: 30,000)
    /// - `RECONNECT_JITTER` - Backoff jitter fraction (default: 0.5)
    /// - `CONNECT_TIMEOUT_MS` - Connect timeout (default: 5,000)
    /// - `RESPONSE_TIMEOUT_MS` - Response timeout (default: 5,000)
    /// - `REDIS_READY_CHECK` - Ready check on connect (default: true)
    /// - `CACHE_MAX_ENTRIES` - In-memory store capacity (default: 10,000)
    ///
    /// Values that fail to parse fall back to their default.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            redis_host: lookup("REDIS_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            redis_port: parse_or(&lookup, "REDIS_PORT", 6379),
            redis_password: lookup("REDIS_PASSWORD").unwrap_or_default(),
            redis_db: parse_or(&lookup, "REDIS_DB", 0),
            heartbeat_interval_seconds: parse_or(&lookup, "HEARTBEAT_INTERVAL_SECONDS", 60),
            reconnect_base_delay_ms: parse_or(&lookup, "RECONNECT_BASE_DELAY_MS", 100),
            reconnect_max_delay_ms: parse_or(&lookup, "RECONNECT_MAX_DELAY_MS", 30_000),
            reconnect_jitter: parse_or(&lookup, "RECONNECT_JITTER", 0.5),
            connect_timeout_ms: parse_or(&lookup, "CONNECT_TIMEOUT_MS", 5_000),
            response_timeout_ms: parse_or(&lookup, "RESPONSE_TIMEOUT_MS", 5_000),
            ready_check: lookup("REDIS_READY_CHECK")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(true),
            cache_max_entries: parse_or(&lookup, "CACHE_MAX_ENTRIES", 10_000),
        }
    }

    /// Password to authenticate with, if any.
    pub fn redis_password(&self) -> Option<&str> {
        Some(self.redis_password.as_str()).filter(|p| !p.is_empty())
    }

    /// Heartbeat period as a Duration. Never zero.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds.max(1))
    }

    /// Reconnect backoff policy.
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.reconnect_base_delay_ms),
            Duration::from_millis(self.reconnect_max_delay_ms),
            self.reconnect_jitter,
        )
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(name)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
