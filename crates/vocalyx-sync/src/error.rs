//! Client error types.

use reqwest::StatusCode;
use thiserror::Error;

/// Client error type.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network unreachable, connection refused, request timed out.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed inbound stream frame.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// Backend answered with a non-2xx status. Displays the backend message verbatim.
    #[error("{message}")]
    Application { status: StatusCode, message: String },

    /// Client-side guard failed before any network call.
    #[error("{0}")]
    Validation(String),

    #[error("response decode error: {0}")]
    Decode(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("timeout error: {0}")]
    Timeout(String),

    #[error("not connected")]
    NotConnected,

    #[error("connection manager shut down")]
    ShutDown,
}

/// Coarse error classes used to decide how a failure reaches the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Protocol,
    ConnectionLost,
    Application,
    Validation,
}

/// Severity used when a failure is turned into a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl ClientError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Application { .. } => ErrorKind::Application,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Protocol(_) | Self::Serialization(_) => ErrorKind::Protocol,
            Self::ConnectionLost(_) => ErrorKind::ConnectionLost,
            Self::Transport(_)
            | Self::Decode(_)
            | Self::WebSocket(_)
            | Self::InvalidUrl(_)
            | Self::UrlParse(_)
            | Self::Timeout(_)
            | Self::NotConnected
            | Self::ShutDown => ErrorKind::Transport,
        }
    }

    #[must_use]
    pub fn notification_level(&self) -> NotificationLevel {
        match self.kind() {
            ErrorKind::Validation => NotificationLevel::Warning,
            _ => NotificationLevel::Error,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error.to_string())
        } else if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Transport(error.to_string())
        }
    }
}

/// Client result type.
pub type Result<T> = std::result::Result<T, ClientError>;
