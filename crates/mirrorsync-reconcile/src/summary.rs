//! Per-record reports and the cycle summary.

use chrono::{DateTime, Utc};
use mirrorsync_core::RecordStatus;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Processing state of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    Fetching,
    Classifying,
    MetadataSync,
    FileSync,
    Committing,
    /// Processed; for `identical` records nothing was done.
    Done,
    /// Not committed. Retried from `Fetching` on the next cycle.
    Failed,
}

impl std::fmt::Display for RecordState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fetching => write!(f, "fetching"),
            Self::Classifying => write!(f, "classifying"),
            Self::MetadataSync => write!(f, "metadata_sync"),
            Self::FileSync => write!(f, "file_sync"),
            Self::Committing => write!(f, "committing"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// What happened to one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordReport {
    pub external_id: String,
    /// `None` when the record failed before it could be classified.
    pub status: Option<RecordStatus>,
    pub state: RecordState,
    pub files_added: u32,
    pub files_deleted: u32,
    pub files_replaced: u32,
    pub files_failed: u32,
    pub files_oversize: u32,
}

impl RecordReport {
    pub(crate) fn new(external_id: &str) -> Self {
        Self {
            external_id: external_id.to_string(),
            status: None,
            state: RecordState::Fetching,
            files_added: 0,
            files_deleted: 0,
            files_replaced: 0,
            files_failed: 0,
            files_oversize: 0,
        }
    }

    /// Whether the record ended in [`RecordState::Failed`].
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.state == RecordState::Failed
    }
}

/// Structured result of one reconciliation cycle.
///
/// Returned for every cycle that was not aborted, including cycles with
/// recorded failures and cancelled cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Records returned by the poll plus records queued for retry.
    pub polled: u32,
    pub new: u32,
    pub updated: u32,
    pub lastmod_stale: u32,
    pub identical: u32,
    /// Records that failed before classification.
    pub unclassified: u32,
    pub failed: u32,
    pub excluded: u32,
    pub files_added: u32,
    pub files_deleted: u32,
    pub files_replaced: u32,
    pub files_failed: u32,
    pub files_oversize: u32,
    pub dry_run: bool,
    pub cancelled: bool,
    /// Whether the poll returned enough records to trigger the warning.
    pub large_batch: bool,
    /// Whether the checkpoint was advanced at the end of the cycle.
    pub checkpoint_advanced: bool,
}

impl CycleSummary {
    #[must_use]
    pub fn new(started_at: DateTime<Utc>, dry_run: bool) -> Self {
        Self {
            started_at: Some(started_at),
            dry_run,
            ..Self::default()
        }
    }

    /// Fold one record report into the totals.
    pub fn record(&mut self, report: &RecordReport) {
        match report.status {
            Some(RecordStatus::New) => self.new += 1,
            Some(RecordStatus::Updated) => self.updated += 1,
            Some(RecordStatus::LastmodStale) => self.lastmod_stale += 1,
            Some(RecordStatus::Identical) => self.identical += 1,
            None => self.unclassified += 1,
        }
        if report.is_failed() {
            self.failed += 1;
        }
        self.files_added += report.files_added;
        self.files_deleted += report.files_deleted;
        self.files_replaced += report.files_replaced;
        self.files_failed += report.files_failed;
        self.files_oversize += report.files_oversize;
    }

    /// Records that were processed (excluded ones are not).
    #[must_use]
    pub fn processed(&self) -> u32 {
        self.new + self.updated + self.lastmod_stale + self.identical + self.unclassified
    }

    /// Whether anything needs manual attention.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.files_failed > 0 || self.files_oversize > 0
    }

    pub(crate) fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Emit the summary as a single structured event.
    pub fn log(&self) {
        info!(
            polled = self.polled,
            new = self.new,
            updated = self.updated,
            lastmod_stale = self.lastmod_stale,
            identical = self.identical,
            failed = self.failed,
            excluded = self.excluded,
            files_added = self.files_added,
            files_deleted = self.files_deleted,
            files_replaced = self.files_replaced,
            files_failed = self.files_failed,
            files_oversize = self.files_oversize,
            dry_run = self.dry_run,
            cancelled = self.cancelled,
            checkpoint_advanced = self.checkpoint_advanced,
            "Reconciliation cycle finished"
        );
    }
}
