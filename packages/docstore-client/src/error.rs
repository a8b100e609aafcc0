//! Error types for the document store client.

use thiserror::Error;

/// Result type for document store client operations.
pub type Result<T> = std::result::Result<T, DocStoreError>;

/// Document store client errors.
#[derive(Debug, Error)]
pub enum DocStoreError {
    /// Transport failure (connection refused, DNS, TLS, body decode)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response that the endpoint does not treat as a normal outcome
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
}

impl DocStoreError {
    /// HTTP status of an API error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            DocStoreError::Api { status, .. } => Some(*status),
            DocStoreError::Http(e) => e.status().map(|s| s.as_u16()),
        }
    }

    /// Whether the request never got a response (connect/timeout failure).
    pub fn is_connect(&self) -> bool {
        matches!(self, DocStoreError::Http(e) if e.is_connect() || e.is_timeout())
    }
}
