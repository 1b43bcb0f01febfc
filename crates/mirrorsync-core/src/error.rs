//! Error taxonomy shared by the ledger, the clients and the driver.
//!
//! Errors carry a [`ErrorKind`] so callers branch on the kind instead of
//! matching message text.

use thiserror::Error;

/// Classification used by the driver to pick a failure policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Transport,
    NotFound,
    Auth,
    IdentityMismatch,
    LedgerConsistency,
    SizeLimitExceeded,
    InvalidData,
    Storage,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport => write!(f, "transport"),
            Self::NotFound => write!(f, "not_found"),
            Self::Auth => write!(f, "auth"),
            Self::IdentityMismatch => write!(f, "identity_mismatch"),
            Self::LedgerConsistency => write!(f, "ledger_consistency"),
            Self::SizeLimitExceeded => write!(f, "size_limit_exceeded"),
            Self::InvalidData => write!(f, "invalid_data"),
            Self::Storage => write!(f, "storage"),
        }
    }
}

/// Errors raised while reconciling source records into the target.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network or HTTP failure that survived transport-level retries.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The requested source or target object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid or expired credential.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Transferred content does not match the source-reported digest.
    #[error("checksum mismatch for {identity}: expected {expected}, got {actual}")]
    IdentityMismatch {
        identity: String,
        expected: String,
        actual: String,
    },

    /// The ledger contradicts itself, e.g. a snapshot without a mapping.
    #[error("ledger inconsistency for {external_id}: {message}")]
    LedgerConsistency {
        external_id: String,
        message: String,
    },

    /// File exceeds the target's maximum ingest size.
    #[error("{identity} is {size} bytes, exceeding the upload limit of {limit} bytes")]
    SizeLimitExceeded {
        identity: String,
        size: u64,
        limit: u64,
    },

    /// Upstream payload could not be interpreted.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Ledger storage is unavailable.
    #[error("ledger storage error: {0}")]
    Storage(String),
}

impl SyncError {
    /// Create a transport error without an underlying source.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Create a transport error wrapping an underlying error.
    pub fn transport_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a ledger consistency error.
    pub fn ledger_consistency(external_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LedgerConsistency {
            external_id: external_id.into(),
            message: message.into(),
        }
    }

    /// Create an identity mismatch error.
    pub fn identity_mismatch(
        identity: impl ToString,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        Self::IdentityMismatch {
            identity: identity.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport { .. } => ErrorKind::Transport,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Auth(_) => ErrorKind::Auth,
            Self::IdentityMismatch { .. } => ErrorKind::IdentityMismatch,
            Self::LedgerConsistency { .. } => ErrorKind::LedgerConsistency,
            Self::SizeLimitExceeded { .. } => ErrorKind::SizeLimitExceeded,
            Self::InvalidData(_) => ErrorKind::InvalidData,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Whether this error must abort the whole cycle.
    ///
    /// Only credential failures and an unavailable ledger qualify; everything
    /// else is isolated to the file or record it happened on.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Auth | ErrorKind::Storage)
    }
}

/// Result type for reconciliation operations.
pub type SyncResult<T> = Result<T, SyncError>;
