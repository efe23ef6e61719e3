//! Error types for shopsync
//!
//! Provides structured error handling for both the sync runtime and the remote connectors.

use std::fmt;
use thiserror::Error;

/// Result type alias for the shopsync runtime
pub type Result<T> = std::result::Result<T, SyncError>;

/// Result type alias for connector operations
pub type ConnectorResult<T> = std::result::Result<T, ConnectorError>;

/// Main error type for the shopsync runtime
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Stream error
    #[error("Stream '{name}' error: {message}")]
    Stream { name: String, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Connector error (from individual connectors)
    #[error(transparent)]
    Connector(#[from] ConnectorError),
}

/// Errors that can occur in connector operations
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Configuration validation failed
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection to external system failed
    #[error("connection error: {0}")]
    Connection(String),

    /// Authentication failed
    #[error("authentication error: {0}")]
    Auth(String),

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Rate limited by external system
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Timeout waiting for response
    #[error("timeout: {0}")]
    Timeout(String),

    /// Remote system answered with a non-success status
    #[error("http status {status}: {body}")]
    Http { status: u16, body: String },

    /// Data serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Checkpoint state error
    #[error("state error: {0}")]
    State(String),

    /// Request failed without a status, e.g. the body could not be sent
    #[error("transient error: {0}")]
    Transient(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectorError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a transient error
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Create an HTTP status error
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self::Http {
            status,
            body: body.into(),
        }
    }
}

impl From<reqwest::Error> for ConnectorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_connect() {
            Self::Connection(e.to_string())
        } else if e.is_decode() {
            Self::Serialization(e.to_string())
        } else if let Some(status) = e.status() {
            Self::http(status.as_u16(), e.to_string())
        } else {
            Self::Transient(e.to_string())
        }
    }
}

impl SyncError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a stream error
    pub fn stream(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Stream {
            name: name.into(),
            message: msg.into(),
        }
    }
}

/// Stream status for logging and the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    /// Starting up
    Starting,
    /// Running normally
    Running,
    /// Stopped
    Stopped,
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SyncError::stream("orders", "poller closed");
        assert_eq!(err.to_string(), "Stream 'orders' error: poller closed");

        let err = ConnectorError::http(422, "Order id already exists");
        assert_eq!(err.to_string(), "http status 422: Order id already exists");
    }

    #[test]
    fn test_stream_status_display() {
        assert_eq!(StreamStatus::Running.to_string(), "running");
        assert_eq!(StreamStatus::Stopped.to_string(), "stopped");
    }
}
