//! Canonical record, file and outcome types.
//!
//! Every file fetched from the source is normalized into a single
//! [`SourceFile`] shape at the source boundary; nothing downstream sees the
//! upstream JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::digest::Digest;
use crate::identity::FileIdentity;

/// A file as listed by the source for one record at one poll.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceFile {
    /// Download reference. Not stable across polls and never used as identity.
    pub download_url: String,
    /// Display name (the file path within the record).
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<Digest>,
}

impl SourceFile {
    /// Identity key of this file.
    #[must_use]
    pub fn identity(&self) -> FileIdentity {
        FileIdentity::of(self)
    }
}

/// One record as observed at the source.
///
/// Compared by deep equality; the ledger stores every committed version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Stable external identifier, e.g. a DOI.
    pub external_id: String,
    /// Source modification timestamp, kept opaque.
    pub modified: String,
    /// Upstream metadata payload.
    pub metadata: Value,
    #[serde(default)]
    pub files: Vec<SourceFile>,
}

impl SourceRecord {
    /// Create a record without files.
    #[must_use]
    pub fn new(external_id: impl Into<String>, modified: impl Into<String>, metadata: Value) -> Self {
        Self {
            external_id: external_id.into(),
            modified: modified.into(),
            metadata,
            files: Vec::new(),
        }
    }

    /// Attach the file listing fetched separately from the record.
    #[must_use]
    pub fn with_files(mut self, files: Vec<SourceFile>) -> Self {
        self.files = files;
        self
    }

    /// Title from the metadata payload, when present.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.metadata.get("title").and_then(Value::as_str)
    }
}

/// Permanent target identifier of a mirrored record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetMapping {
    pub external_id: String,
    pub persistent_id: String,
}

/// A file that exists on the target, keyed by its source identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetFile {
    pub external_id: String,
    pub identity: FileIdentity,
    pub target_file_id: String,
    /// Checksum computed by the target on ingest.
    pub checksum: Option<Digest>,
    /// Raw target response, kept for audit.
    pub raw_payload: Value,
}

/// A failed or deliberately skipped operation awaiting attention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedOperation {
    pub external_id: String,
    /// File identity key, or [`crate::METADATA_IDENTITY`].
    pub identity_key: String,
    pub status: String,
    /// Permanent failures (oversize files) are never retried automatically.
    pub permanent: bool,
    pub attempts: u32,
}

impl FailedOperation {
    /// File identity of this failure, `None` for the metadata sentinel.
    #[must_use]
    pub fn identity(&self) -> Option<FileIdentity> {
        FileIdentity::from_key(&self.identity_key)
    }
}

/// Descriptive metadata sent with an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadMeta {
    pub name: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&SourceFile> for UploadMeta {
    fn from(file: &SourceFile) -> Self {
        Self {
            name: file.name.clone(),
            mime_type: file.mime_type.clone(),
            description: file.description.clone(),
        }
    }
}

/// Target response to a successful upload or replace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub target_file_id: String,
    pub checksum: Option<Digest>,
    pub raw: Value,
}
