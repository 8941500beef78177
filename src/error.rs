//! Home Connect client error types.
//!
//! Every variant is fatal to the session it occurs in. Nothing in the library
//! retries; the owner of a [`Connection`](crate::client::Connection) decides
//! whether to open a new one.
//!
//! Variants only carry strings so that a single failure can be handed to every
//! task waiting on the ready-session handle.

use std::time::Duration;

use thiserror::Error;

/// Home Connect client errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HomeConnectError {
    /// TCP connect, TLS-PSK negotiation or framing upgrade failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Sending or receiving a framed message failed after setup.
    #[error("Channel error: {0}")]
    Channel(String),

    /// A received message or a required payload field did not decode.
    ///
    /// Also raised when a service catalog lacks an entry a request needs.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The peer broke the framing or handshake contract.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// The session did not become ready in time.
    #[error("Session not ready after {0:?}")]
    Timeout(Duration),

    /// Request text could not be parsed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias for Home Connect operations
pub type Result<T> = std::result::Result<T, HomeConnectError>;

impl From<serde_json::Error> for HomeConnectError {
    fn from(err: serde_json::Error) -> Self {
        HomeConnectError::Decode(err.to_string())
    }
}

impl From<std::io::Error> for HomeConnectError {
    fn from(err: std::io::Error) -> Self {
        HomeConnectError::Transport(err.to_string())
    }
}

impl From<openssl::error::ErrorStack> for HomeConnectError {
    fn from(err: openssl::error::ErrorStack) -> Self {
        HomeConnectError::Transport(format!("TLS error: {err}"))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for HomeConnectError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        HomeConnectError::Channel(err.to_string())
    }
}

impl From<toml::de::Error> for HomeConnectError {
    fn from(err: toml::de::Error) -> Self {
        HomeConnectError::Config(err.to_string())
    }
}

impl From<base64::DecodeError> for HomeConnectError {
    fn from(err: base64::DecodeError) -> Self {
        HomeConnectError::Config(format!("Base64 decode error: {err}"))
    }
}
