//! Client settings read from `VOCALYX_*` environment variables.

use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::connection::ReconnectPolicy;

pub const DEFAULT_DASHBOARD_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5_000;
pub const DEFAULT_SEARCH_DEBOUNCE_MS: u64 = 300;
pub const DEFAULT_PAGE_LIMIT: u32 = 25;

/// Path of the live dashboard stream, relative to the API origin.
pub const STREAM_PATH: &str = "/api/ws/updates";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid VOCALYX_DASHBOARD_URL: {0}")]
    InvalidDashboardUrl(String),
    #[error("invalid VOCALYX_API_URL: {0}")]
    InvalidApiUrl(String),
    #[error("invalid VOCALYX_REQUEST_TIMEOUT_MS: {0}")]
    InvalidRequestTimeoutMs(String),
    #[error("invalid VOCALYX_CONNECT_TIMEOUT_MS: {0}")]
    InvalidConnectTimeoutMs(String),
    #[error("invalid VOCALYX_RECONNECT_DELAY_MS: {0}")]
    InvalidReconnectDelayMs(String),
    #[error("invalid VOCALYX_RECONNECT_MAX_DELAY_MS: {0}")]
    InvalidReconnectMaxDelayMs(String),
    #[error("invalid VOCALYX_RECONNECT_MAX_ATTEMPTS: {0}")]
    InvalidReconnectMaxAttempts(String),
    #[error("invalid VOCALYX_SEARCH_DEBOUNCE_MS: {0}")]
    InvalidSearchDebounceMs(String),
    #[error("invalid VOCALYX_PAGE_LIMIT: {0}")]
    InvalidPageLimit(String),
}

/// Session-wide client settings. Built once and handed to every component.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Origin serving the dashboard REST proxy.
    pub dashboard_url: String,
    /// Origin exposing the live stream; `http(s)` is rewritten to `ws(s)`.
    pub api_url: String,
    pub admin_key: Option<String>,
    pub default_project_name: Option<String>,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    pub search_debounce: Duration,
    pub page_limit: u32,
}

impl ClientConfig {
    #[must_use]
    pub fn new(dashboard_url: impl Into<String>) -> Self {
        let dashboard_url = dashboard_url.into();
        Self {
            api_url: dashboard_url.clone(),
            dashboard_url,
            admin_key: None,
            default_project_name: None,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            reconnect: ReconnectPolicy::default(),
            search_debounce: Duration::from_millis(DEFAULT_SEARCH_DEBOUNCE_MS),
            page_limit: DEFAULT_PAGE_LIMIT,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let dashboard_url = read("VOCALYX_DASHBOARD_URL")
            .unwrap_or_else(|| DEFAULT_DASHBOARD_URL.to_string());
        if !is_http_origin(&dashboard_url) {
            return Err(ConfigError::InvalidDashboardUrl(dashboard_url));
        }
        let api_url = read("VOCALYX_API_URL").unwrap_or_else(|| dashboard_url.clone());
        if !is_http_origin(&api_url) {
            return Err(ConfigError::InvalidApiUrl(api_url));
        }

        let request_timeout_ms = parse_or(
            read("VOCALYX_REQUEST_TIMEOUT_MS"),
            DEFAULT_REQUEST_TIMEOUT_MS,
            ConfigError::InvalidRequestTimeoutMs,
        )?;
        let connect_timeout_ms = parse_or(
            read("VOCALYX_CONNECT_TIMEOUT_MS"),
            DEFAULT_CONNECT_TIMEOUT_MS,
            ConfigError::InvalidConnectTimeoutMs,
        )?;
        let reconnect_delay_ms = parse_or(
            read("VOCALYX_RECONNECT_DELAY_MS"),
            DEFAULT_RECONNECT_DELAY_MS,
            ConfigError::InvalidReconnectDelayMs,
        )?;
        let reconnect_max_delay_ms = read("VOCALYX_RECONNECT_MAX_DELAY_MS")
            .map(|value| {
                value
                    .parse::<u64>()
                    .map_err(|error| ConfigError::InvalidReconnectMaxDelayMs(error.to_string()))
            })
            .transpose()?;
        let reconnect_max_attempts = read("VOCALYX_RECONNECT_MAX_ATTEMPTS")
            .map(|value| {
                value
                    .parse::<u32>()
                    .map_err(|error| ConfigError::InvalidReconnectMaxAttempts(error.to_string()))
            })
            .transpose()?;
        let search_debounce_ms = parse_or(
            read("VOCALYX_SEARCH_DEBOUNCE_MS"),
            DEFAULT_SEARCH_DEBOUNCE_MS,
            ConfigError::InvalidSearchDebounceMs,
        )?;
        let page_limit = parse_or(
            read("VOCALYX_PAGE_LIMIT"),
            DEFAULT_PAGE_LIMIT,
            ConfigError::InvalidPageLimit,
        )?;
        if page_limit == 0 {
            return Err(ConfigError::InvalidPageLimit("must be at least 1".to_string()));
        }

        let mut reconnect = ReconnectPolicy::fixed(Duration::from_millis(reconnect_delay_ms));
        if let Some(max_delay_ms) = reconnect_max_delay_ms {
            reconnect = reconnect.with_backoff(Duration::from_millis(max_delay_ms));
        }
        if let Some(max_attempts) = reconnect_max_attempts {
            reconnect = reconnect.with_max_attempts(max_attempts);
        }

        Ok(Self {
            dashboard_url,
            api_url,
            admin_key: read("VOCALYX_ADMIN_KEY"),
            default_project_name: read("VOCALYX_DEFAULT_PROJECT_NAME"),
            request_timeout: Duration::from_millis(request_timeout_ms),
            connect_timeout: Duration::from_millis(connect_timeout_ms),
            reconnect,
            search_debounce: Duration::from_millis(search_debounce_ms),
            page_limit,
        })
    }

    /// WebSocket URL of the live dashboard stream.
    #[must_use]
    pub fn stream_url(&self) -> String {
        let origin = self.api_url.trim().trim_end_matches('/');
        let origin = if let Some(rest) = origin.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = origin.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            origin.to_string()
        };
        format!("{origin}{STREAM_PATH}")
    }
}

fn is_http_origin(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn parse_or<T>(
    value: Option<String>,
    default: T,
    to_error: fn(String) -> ConfigError,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw.parse::<T>().map_err(|error| to_error(error.to_string())),
        None => Ok(default),
    }
}
