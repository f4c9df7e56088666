//! Error types for the dashboard API client.
//!
//! # Design
//! Every failure the client surfaces is one `HttpError`, whatever stage of
//! the pipeline produced it. `kind` records where it came from, `status`
//! carries the HTTP status (0 when no response was received), and `code` /
//! `data` echo the backend envelope when one could be decoded. Error
//! interceptors receive and return this same type, so they can rewrite the
//! message without losing the classification.

use serde_json::Value;
use thiserror::Error;

/// Message used when the per-request timeout elapses.
pub const TIMEOUT_MESSAGE: &str = "request timed out";

/// Status reported for timeouts.
pub const TIMEOUT_STATUS: u16 = 408;

/// Where in the pipeline a failure was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transport-level failure: DNS, refused connection, reset.
    Network,
    /// The configured timeout elapsed before a response arrived.
    Timeout,
    /// Envelope `code` was not 200.
    Business,
    /// Transport succeeded but the HTTP status was outside 2xx.
    HttpStatus,
    /// The envelope was fine but `data` did not match the caller's type.
    Decode,
    /// The request could not be built (body serialization, interceptor).
    Request,
    /// Local file I/O while saving a download.
    Io,
}

/// Unified error returned by every `HttpClient` call.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HttpError {
    pub kind: ErrorKind,
    pub message: String,
    pub status: u16,
    pub code: Option<i64>,
    pub data: Option<Value>,
}

impl HttpError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, status: u16) -> Self {
        Self {
            kind,
            message: message.into(),
            status,
            code: None,
            data: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message, 0)
    }

    pub fn timeout() -> Self {
        Self::new(ErrorKind::Timeout, TIMEOUT_MESSAGE, TIMEOUT_STATUS)
    }

    pub fn request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Request, message, 0)
    }

    pub fn io(err: &std::io::Error) -> Self {
        Self::new(ErrorKind::Io, err.to_string(), 0)
    }

    pub fn decode(message: impl Into<String>, status: u16) -> Self {
        Self::new(ErrorKind::Decode, message, status)
    }

    /// Failure reported by the envelope or the HTTP status line.
    ///
    /// A non-200 business code takes precedence when both checks fail.
    pub fn rejected(
        message: impl Into<String>,
        status: u16,
        code: Option<i64>,
        data: Option<Value>,
    ) -> Self {
        let kind = if code != Some(200) {
            ErrorKind::Business
        } else {
            ErrorKind::HttpStatus
        };
        Self {
            kind,
            message: message.into(),
            status,
            code,
            data,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == ErrorKind::Timeout
    }

    pub fn is_network(&self) -> bool {
        self.kind == ErrorKind::Network
    }

    /// True for any failure carrying HTTP 401, regardless of kind.
    pub fn is_auth_expired(&self) -> bool {
        self.status == 401
    }
}

/// Errors raised while loading `ClientConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
