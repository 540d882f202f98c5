//! Yardline Error Types
//!
//! Errors surfaced by the backend client. Config resolution itself never fails.

use thiserror::Error;

/// Main error type for Yardline operations
#[derive(Debug, Error)]
pub enum YardlineError {
    /// Configuration errors (bad launch URL, unreadable env file, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP request failed or the platform answered with a non-success status
    #[error("Request failed: {0}")]
    Request(String),

    /// Response parsing failed
    #[error("Response error: {0}")]
    Response(String),

    /// The platform rejected the credentials
    #[error("Authentication failed: {0}. Check the public key or the user session.")]
    Auth(String),

    /// The connection could not be established; the request was never sent
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Timeout
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// No backend client could be built for this process
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl YardlineError {
    /// Whether retrying the same call might succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, YardlineError::Connection(_) | YardlineError::Timeout(_))
    }
}

impl From<reqwest::Error> for YardlineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            YardlineError::Timeout(err.to_string())
        } else if err.is_connect() {
            YardlineError::Connection(err.to_string())
        } else if err.is_decode() {
            YardlineError::Response(format!("Failed to decode response: {}", err))
        } else {
            YardlineError::Request(err.to_string())
        }
    }
}

impl From<serde_json::Error> for YardlineError {
    fn from(err: serde_json::Error) -> Self {
        YardlineError::Response(format!("JSON parsing error: {}", err))
    }
}

impl From<reqwest::header::InvalidHeaderValue> for YardlineError {
    fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
        YardlineError::Config(format!("Invalid header value: {}", err))
    }
}

/// Result type alias for Yardline operations
pub type Result<T> = std::result::Result<T, YardlineError>;
