//! Cycle-level errors.
//!
//! Everything short of these is absorbed into the ledger as a failed
//! operation and reported in the [`crate::CycleSummary`].

use mirrorsync_core::SyncError;
use thiserror::Error;

/// Reasons a whole reconciliation cycle stops.
#[derive(Debug, Error)]
pub enum CycleError {
    /// The target rejected the credential before any record was touched.
    #[error("credential validation failed: {0}")]
    Credentials(#[source] SyncError),

    /// The list of records due for a check could not be obtained.
    #[error("failed to list changed records: {0}")]
    Listing(#[source] SyncError),

    /// A fatal error while processing one record.
    #[error("cycle aborted while processing {external_id}: {source}")]
    Aborted {
        external_id: String,
        #[source]
        source: SyncError,
    },

    /// The ledger failed outside any record.
    #[error("ledger unavailable: {0}")]
    Ledger(#[source] SyncError),
}

impl CycleError {
    /// External id of the record in progress, if any.
    #[must_use]
    pub fn external_id(&self) -> Option<&str> {
        match self {
            Self::Aborted { external_id, .. } => Some(external_id),
            _ => None,
        }
    }

    /// Underlying sync error.
    #[must_use]
    pub fn sync_error(&self) -> &SyncError {
        match self {
            Self::Credentials(e) | Self::Listing(e) | Self::Ledger(e) => e,
            Self::Aborted { source, .. } => source,
        }
    }
}
