//! Runtime configuration loaded from the environment.
//!
//! Values come from process environment variables, optionally seeded from
//! `.env.local` / `.env` files via [`load_dotenv`].

use std::path::Path;
use std::time::Duration;

use url::Url;

/// Default base URL of the room HTTP API.
pub const DEFAULT_API_URL: &str = "http://localhost:3000";

/// Default URL of the real-time channel.
pub const DEFAULT_WS_URL: &str = "ws://localhost:3000/ws";

pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1_000;
pub const DEFAULT_RECONNECT_MAX_DELAY_MS: u64 = 10_000;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} is not a valid URL: {source}")]
    InvalidUrl {
        var: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("{var} must use one of {expected:?}, got {scheme}")]
    UnsupportedScheme {
        var: &'static str,
        scheme: String,
        expected: &'static [&'static str],
    },
}

/// Bounded reconnection policy for the real-time channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            initial_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            max_delay_ms: DEFAULT_RECONNECT_MAX_DELAY_MS,
            multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    pub api_base_url: String,
    pub ws_url: String,
    pub reconnect: ReconnectPolicy,
    pub http_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            reconnect: ReconnectPolicy::default(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

impl SyncConfig {
    /// Create config from environment variables.
    ///
    /// Uses `AGILEFLOW_API_URL`, `AGILEFLOW_WS_URL`, `AGILEFLOW_RECONNECT_ATTEMPTS`,
    /// `AGILEFLOW_RECONNECT_DELAY_MS`, `AGILEFLOW_RECONNECT_MAX_DELAY_MS` and
    /// `AGILEFLOW_HTTP_TIMEOUT_SECS`, falling back to defaults if not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_base_url = lookup("AGILEFLOW_API_URL")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let ws_url = lookup("AGILEFLOW_WS_URL")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_WS_URL.to_string());

        check_url("AGILEFLOW_API_URL", &api_base_url, &["http", "https"])?;
        check_url("AGILEFLOW_WS_URL", &ws_url, &["ws", "wss"])?;

        let reconnect = ReconnectPolicy {
            max_attempts: parse_or(
                &lookup,
                "AGILEFLOW_RECONNECT_ATTEMPTS",
                DEFAULT_RECONNECT_ATTEMPTS,
            ),
            initial_delay_ms: parse_or(
                &lookup,
                "AGILEFLOW_RECONNECT_DELAY_MS",
                DEFAULT_RECONNECT_DELAY_MS,
            ),
            max_delay_ms: parse_or(
                &lookup,
                "AGILEFLOW_RECONNECT_MAX_DELAY_MS",
                DEFAULT_RECONNECT_MAX_DELAY_MS,
            ),
            ..ReconnectPolicy::default()
        };

        let http_timeout = Duration::from_secs(parse_or(
            &lookup,
            "AGILEFLOW_HTTP_TIMEOUT_SECS",
            DEFAULT_HTTP_TIMEOUT_SECS,
        ));

        Ok(Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            ws_url,
            reconnect,
            http_timeout,
        })
    }
}

/// Load `.env.local` then `.env` from `dir`. Earlier files win; existing
/// process variables are never overridden.
pub fn load_dotenv(dir: &Path) {
    for filename in [".env.local", ".env"] {
        let path = dir.join(filename);
        if path.exists() {
            if let Err(e) = dotenvy::from_path(&path) {
                tracing::warn!(path = %path.display(), error = %e, "Failed to load env file");
            }
        }
    }
}

fn check_url(
    var: &'static str,
    value: &str,
    expected: &'static [&'static str],
) -> Result<(), ConfigError> {
    let url = Url::parse(value).map_err(|source| ConfigError::InvalidUrl { var, source })?;
    if !expected.iter().any(|scheme| *scheme == url.scheme()) {
        return Err(ConfigError::UnsupportedScheme {
            var,
            scheme: url.scheme().to_string(),
            expected,
        });
    }
    Ok(())
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, var: &str, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Display,
{
    match lookup(var) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(var = %var, value = %raw, fallback = %default, "Invalid value, using default");
                default
            }
        },
    }
}
