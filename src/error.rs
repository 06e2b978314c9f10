//! Error model used by Bugzilla API client operations.

use std::io;

use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BugzillaError>;

/// Represents the error conditions surfaced by client operations: HTTP failures with the
/// status and Bugzilla error code, authentication rejections, timeouts, network issues,
/// malformed or incomplete server payloads, and unmet entity preconditions.
#[derive(Debug, Error)]
pub enum BugzillaError {
    #[error("http {status}: {message}")]
    Http {
        status: StatusCode,
        code: Option<i64>,
        message: String,
    },
    #[error("authentication error: {0}")]
    Authentication(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("precondition not met: {0}")]
    Precondition(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("unexpected error: {0}")]
    Other(String),
}

impl BugzillaError {
    /// Constructs an HTTP error variant with the optional Bugzilla numeric error code.
    pub fn http(status: StatusCode, code: Option<i64>, message: impl Into<String>) -> Self {
        BugzillaError::Http {
            status,
            code,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for BugzillaError {
    /// Converts reqwest errors into semantic BugzillaError variants.
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BugzillaError::Timeout(err.to_string())
        } else if err.is_decode() {
            BugzillaError::Decode(err.to_string())
        } else if err.is_status() {
            let status = err.status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            BugzillaError::Http {
                status,
                code: None,
                message: err.to_string(),
            }
        } else if err.is_connect() {
            BugzillaError::Network(err.to_string())
        } else {
            BugzillaError::Other(err.to_string())
        }
    }
}

impl From<serde_json::Error> for BugzillaError {
    /// Converts serde_json failures into decode errors.
    fn from(err: serde_json::Error) -> Self {
        BugzillaError::Decode(err.to_string())
    }
}
