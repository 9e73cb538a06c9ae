//! Content store client error types.

use thiserror::Error;

/// Content store client error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// HTTP request failed (connection refused, timeout, ...).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Response body could not be decoded.
    #[error("Malformed response: {0}")]
    Decode(String),

    /// Store answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body or status text.
        message: String,
    },

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Check if this is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, StoreError::Http(e) if e.is_timeout())
    }

    /// Check if the store itself reported a server-side failure.
    pub fn is_server_error(&self) -> bool {
        matches!(self, StoreError::Api { status, .. } if *status >= 500)
    }
}

/// Result type for content store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
