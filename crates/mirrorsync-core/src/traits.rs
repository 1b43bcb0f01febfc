//! Collaborator traits.
//!
//! The reconciliation engine only talks to the outside world through these
//! seams. Concrete HTTP bindings live in `mirrorsync-client`; tests use
//! in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::SyncResult;
use crate::types::{SourceFile, SourceRecord, UploadMeta, UploadedFile};

/// Read-only upstream repository.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// External ids of records modified since `since` (all records when `None`).
    async fn changed_since(&self, since: Option<DateTime<Utc>>) -> SyncResult<Vec<String>>;

    /// Fetch record metadata. The returned record carries no files.
    async fn fetch_record(&self, external_id: &str) -> SyncResult<SourceRecord>;

    /// Fetch the complete, flattened file listing of a record.
    async fn fetch_files(&self, external_id: &str) -> SyncResult<Vec<SourceFile>>;

    /// Download the content of one file.
    async fn download(&self, file: &SourceFile) -> SyncResult<Vec<u8>>;
}

/// Writable downstream repository.
#[async_trait]
pub trait TargetClient: Send + Sync {
    /// Check the configured credential before any record is processed.
    async fn validate_credentials(&self) -> SyncResult<()>;

    /// Create a record and return its persistent identifier.
    async fn create_record(&self, payload: &Value) -> SyncResult<String>;

    /// Replace the metadata of an existing record.
    async fn update_record(&self, persistent_id: &str, payload: &Value) -> SyncResult<()>;

    /// Upload a file into a record.
    async fn upload_file(
        &self,
        persistent_id: &str,
        content: Vec<u8>,
        meta: &UploadMeta,
    ) -> SyncResult<UploadedFile>;

    /// Replace the content of an existing file in place.
    async fn replace_file(
        &self,
        target_file_id: &str,
        content: Vec<u8>,
        meta: &UploadMeta,
    ) -> SyncResult<UploadedFile>;

    /// Delete a file.
    async fn delete_file(&self, target_file_id: &str) -> SyncResult<()>;

    /// Whether the record is locked by target-side background processing.
    async fn check_locks(&self, persistent_id: &str) -> SyncResult<bool>;
}

/// Pure mapping from source metadata to the target's metadata payload.
pub trait Transformer: Send + Sync {
    fn to_target_metadata(&self, record: &SourceRecord) -> SyncResult<Value>;
}
