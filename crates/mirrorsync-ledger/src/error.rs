//! Error types for the mirrorsync-ledger crate.
//!
//! Wraps `SQLx` errors with ledger context and converts them into the shared
//! [`SyncError`] taxonomy at the crate boundary.

use mirrorsync_core::SyncError;
use thiserror::Error;

/// Ledger operation errors.
///
/// # Example
///
/// ```rust
/// use mirrorsync_ledger::LedgerError;
///
/// fn handle_error(err: LedgerError) {
///     match err {
///         LedgerError::ConnectionFailed(e) => eprintln!("Cannot open ledger: {}", e),
///         LedgerError::MigrationFailed(e) => eprintln!("Migration error: {}", e),
///         LedgerError::QueryFailed(e) => eprintln!("Query error: {}", e),
///         LedgerError::Serialization(e) => eprintln!("Corrupt blob: {}", e),
///         LedgerError::Consistency { external_id, message } => {
///             eprintln!("{}: {}", external_id, message)
///         }
///     }
/// }
/// ```
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The ledger database could not be opened.
    #[error("Ledger connection failed: {0}")]
    ConnectionFailed(#[source] sqlx::Error),

    /// An embedded migration failed to apply.
    #[error("Migration failed: {0}")]
    MigrationFailed(#[source] sqlx::migrate::MigrateError),

    /// A query failed to execute.
    #[error("Query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),

    /// A stored blob could not be encoded or decoded.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The stored state contradicts itself for one record.
    #[error("Ledger inconsistency for {external_id}: {message}")]
    Consistency {
        external_id: String,
        message: String,
    },
}

impl LedgerError {
    /// Create a consistency error.
    pub fn consistency(external_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Consistency {
            external_id: external_id.into(),
            message: message.into(),
        }
    }

    /// Check if this error is scoped to a single record.
    #[must_use]
    pub fn is_consistency_error(&self) -> bool {
        matches!(self, Self::Consistency { .. })
    }

    /// Check if this error indicates a connection problem.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::ConnectionFailed(_))
    }
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

impl From<LedgerError> for SyncError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Consistency {
                external_id,
                message,
            } => SyncError::LedgerConsistency {
                external_id,
                message,
            },
            other => SyncError::Storage(other.to_string()),
        }
    }
}
