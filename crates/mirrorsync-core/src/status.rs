//! Change status of a source record relative to the ledger.

use serde::{Deserialize, Serialize};

/// Result of classifying a freshly fetched record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordStatus {
    /// No snapshot has ever been committed for this record.
    New,
    /// Deep-equal to the last committed snapshot, timestamp included.
    Identical,
    /// Modification timestamp differs from the last committed snapshot.
    Updated,
    /// Timestamp unchanged but the payload differs.
    ///
    /// The source's own freshness signal disagrees with its data. Metadata is
    /// not re-pushed but files are still diffed.
    LastmodStale,
}

impl RecordStatus {
    /// Whether the record metadata must be pushed to the target.
    #[must_use]
    pub fn pushes_metadata(&self) -> bool {
        matches!(self, Self::New | Self::Updated)
    }

    /// Whether a new snapshot is committed after processing.
    #[must_use]
    pub fn commits_snapshot(&self) -> bool {
        !matches!(self, Self::Identical)
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Identical => write!(f, "identical"),
            Self::Updated => write!(f, "updated"),
            Self::LastmodStale => write!(f, "lastmod-stale"),
        }
    }
}
