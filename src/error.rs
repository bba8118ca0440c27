//! Error types for Recplay

use std::io;

use hyper::StatusCode;
use thiserror::Error;

/// Result type for Recplay operations
pub type Result<T> = std::result::Result<T, RecplayError>;

/// Errors that can occur while talking to the record/playback proxy
#[derive(Debug, Error)]
pub enum RecplayError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Invalid test name
    #[error("Invalid test name: {0}")]
    InvalidTestName(String),

    /// Outgoing request cannot be routed through the proxy
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Underlying HTTP client failed (DNS, connect, TLS)
    #[error("Transport error: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),

    /// Reading a response body failed
    #[error("Body error: {0}")]
    Body(#[from] hyper::Error),

    /// Building an HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::http::Error),

    /// Malformed JSON from the proxy
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TLS configuration could not be built
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Proxy accepted the start call but did not hand out a session id
    #[error("recording ID was not returned by the response. Response body: {body}")]
    RecordingIdMissing {
        /// Response body text, possibly empty
        body: String,
    },

    /// Proxy refused to stop the session
    #[error("proxy did not stop the recording properly ({status}): {body}")]
    StopFailed {
        /// Status returned by the proxy
        status: StatusCode,
        /// Response body, or the error hit while reading it
        body: String,
    },

    /// Session has no recording id yet
    #[error("Session not started: {0}")]
    SessionNotStarted(String),

    /// Session was already started once
    #[error("Session already started with recording id {0}")]
    SessionAlreadyStarted(String),

    /// Session was stopped and cannot be used again
    #[error("Session stopped: {0}")]
    SessionStopped(String),
}
