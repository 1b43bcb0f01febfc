//! Error types for the repository HTTP clients.

use mirrorsync_core::SyncError;
use thiserror::Error;

/// Errors raised while talking to the source or target repository.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection, TLS or body-read failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote answered 429.
    #[error("rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Any other non-success status.
    #[error("HTTP {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("not found: {0}")]
    NotFound(String),

    /// 401 or 403.
    #[error("authentication failed: {0}")]
    AuthError(String),

    /// The response body did not have the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("max retries exceeded after {attempts} attempt(s): {message}")]
    MaxRetriesExceeded { attempts: u32, message: String },
}

impl ClientError {
    /// Transient failures worth another attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            Self::RateLimited { .. } => true,
            _ => false,
        }
    }

    /// Whether the remote answered with a 5xx status.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Status { status, .. } if *status >= 500)
    }

    /// Whether the credential was rejected.
    #[must_use]
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::AuthError(_))
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidConfig(format!("invalid URL: {err}"))
    }
}

impl From<ClientError> for SyncError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::AuthError(message) => SyncError::Auth(message),
            ClientError::NotFound(message) => SyncError::NotFound(message),
            ClientError::InvalidResponse(message) => SyncError::InvalidData(message),
            other => SyncError::transport_with_source(other.to_string(), other),
        }
    }
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
