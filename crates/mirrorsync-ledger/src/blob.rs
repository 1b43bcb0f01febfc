//! Serialized forms of snapshot columns.

use mirrorsync_core::{SourceFile, SourceRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `records.snapshot_blob` as written. Files live in `record_files`.
#[derive(Serialize)]
pub(crate) struct SnapshotBlobRef<'a> {
    pub external_id: &'a str,
    pub modified: &'a str,
    pub metadata: &'a Value,
}

impl<'a> From<&'a SourceRecord> for SnapshotBlobRef<'a> {
    fn from(record: &'a SourceRecord) -> Self {
        Self {
            external_id: &record.external_id,
            modified: &record.modified,
            metadata: &record.metadata,
        }
    }
}

/// `records.snapshot_blob` as read back.
#[derive(Deserialize)]
pub(crate) struct SnapshotBlob {
    pub external_id: String,
    pub modified: String,
    pub metadata: Value,
}

impl SnapshotBlob {
    pub fn into_record(self, files: Vec<SourceFile>) -> SourceRecord {
        SourceRecord::new(self.external_id, self.modified, self.metadata).with_files(files)
    }
}
