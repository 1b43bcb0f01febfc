//! The persistent reconciliation ledger.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use mirrorsync_core::{
    Digest, FailedOperation, FileIdentity, SourceFile, SourceRecord, TargetFile, TargetMapping,
};
use serde_json::Value;
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, instrument, warn};

use crate::blob::SnapshotBlob;
use crate::error::{LedgerError, LedgerResult};
use crate::migrations::run_migrations;
use crate::pool::LedgerPool;
use crate::txn::RecordTxn;

/// Last committed state of one record.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSnapshot {
    pub record_id: i64,
    pub record: SourceRecord,
    pub mapping: TargetMapping,
    pub committed_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct SnapshotRow {
    id: i64,
    snapshot_blob: String,
    target_mapping_blob: String,
    committed_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct TargetFileRow {
    external_id: String,
    source_identity_key: String,
    target_file_id: String,
    checksum_algorithm: Option<String>,
    checksum: Option<String>,
    raw_payload: String,
}

impl TargetFileRow {
    fn into_target_file(self) -> LedgerResult<TargetFile> {
        let identity = FileIdentity::from_key(&self.source_identity_key).ok_or_else(|| {
            LedgerError::consistency(
                &self.external_id,
                format!("unreadable identity key {}", self.source_identity_key),
            )
        })?;
        let raw_payload: Value = serde_json::from_str(&self.raw_payload)?;
        Ok(TargetFile {
            checksum: Digest::from_parts(self.checksum_algorithm.as_deref(), self.checksum.as_deref()),
            external_id: self.external_id,
            identity,
            target_file_id: self.target_file_id,
            raw_payload,
        })
    }
}

#[derive(FromRow)]
struct FailureRow {
    external_id: String,
    source_identity_key: String,
    status: String,
    permanent: bool,
    attempts: i64,
}

impl From<FailureRow> for FailedOperation {
    fn from(row: FailureRow) -> Self {
        Self {
            external_id: row.external_id,
            identity_key: row.source_identity_key,
            status: row.status,
            permanent: row.permanent,
            attempts: u32::try_from(row.attempts).unwrap_or(u32::MAX),
        }
    }
}

/// Durable store of snapshots, mappings, target files, failures and the
/// poll checkpoint.
///
/// Cloning is cheap and every clone shares the same connection.
#[derive(Debug, Clone)]
pub struct Ledger {
    pool: LedgerPool,
    writes: Arc<AtomicU64>,
}

impl Ledger {
    /// Open an on-disk ledger, creating and migrating it when needed.
    pub async fn open(path: &Path) -> LedgerResult<Self> {
        Self::with_pool(LedgerPool::open(path).await?).await
    }

    /// Open a fresh in-memory ledger.
    pub async fn in_memory() -> LedgerResult<Self> {
        Self::with_pool(LedgerPool::in_memory().await?).await
    }

    /// Wrap an existing pool, applying pending migrations.
    pub async fn with_pool(pool: LedgerPool) -> LedgerResult<Self> {
        run_migrations(&pool).await?;
        Ok(Self {
            pool,
            writes: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Number of write operations performed through this handle.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &LedgerPool {
        &self.pool
    }

    fn db(&self) -> &SqlitePool {
        self.pool.inner()
    }

    fn note_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    // ---- Snapshots ----

    /// Latest committed snapshot of a record together with its mapping.
    ///
    /// A snapshot whose mapping row is missing or disagrees is reported as a
    /// consistency error rather than silently ignored.
    #[instrument(skip(self))]
    pub async fn latest_snapshot(&self, external_id: &str) -> LedgerResult<Option<StoredSnapshot>> {
        let row: Option<SnapshotRow> = sqlx::query_as(
            r"
            SELECT id, snapshot_blob, target_mapping_blob, committed_at
            FROM records
            WHERE external_id = ?
            ORDER BY id DESC
            LIMIT 1
            ",
        )
        .bind(external_id)
        .fetch_optional(self.db())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mapping: TargetMapping = serde_json::from_str(&row.target_mapping_blob)?;
        match self.target_mapping(external_id).await? {
            None => {
                return Err(LedgerError::consistency(
                    external_id,
                    "snapshot committed without a target mapping",
                ));
            }
            Some(current) if current.persistent_id != mapping.persistent_id => {
                return Err(LedgerError::consistency(
                    external_id,
                    format!(
                        "snapshot references {} but the record is mapped to {}",
                        mapping.persistent_id, current.persistent_id
                    ),
                ));
            }
            Some(_) => {}
        }

        let files = self.files_of(external_id, row.id).await?;
        let blob: SnapshotBlob = serde_json::from_str(&row.snapshot_blob)?;

        Ok(Some(StoredSnapshot {
            record_id: row.id,
            record: blob.into_record(files),
            mapping,
            committed_at: row.committed_at,
        }))
    }

    /// File listing of the latest committed snapshot, empty when none exists.
    #[instrument(skip(self))]
    pub async fn latest_file_snapshot(&self, external_id: &str) -> LedgerResult<Vec<SourceFile>> {
        let record_id: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM records WHERE external_id = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(external_id)
        .fetch_optional(self.db())
        .await?;

        match record_id {
            Some(id) => self.files_of(external_id, id).await,
            None => Ok(Vec::new()),
        }
    }

    async fn files_of(&self, external_id: &str, record_id: i64) -> LedgerResult<Vec<SourceFile>> {
        let blob: Option<String> =
            sqlx::query_scalar("SELECT file_snapshot_blob FROM record_files WHERE record_id = ?")
                .bind(record_id)
                .fetch_optional(self.db())
                .await?;

        match blob {
            Some(blob) => Ok(serde_json::from_str(&blob)?),
            None => Err(LedgerError::consistency(
                external_id,
                format!("snapshot {record_id} has no file listing"),
            )),
        }
    }

    /// Open the commit scope for one record.
    pub async fn begin_record(&self, external_id: &str) -> LedgerResult<RecordTxn> {
        let tx = self.db().begin().await?;
        Ok(RecordTxn::new(tx, external_id.to_string(), Arc::clone(&self.writes)))
    }

    /// Append a snapshot in its own transaction. Returns the snapshot row id.
    pub async fn commit_record(
        &self,
        record: &SourceRecord,
        mapping: &TargetMapping,
    ) -> LedgerResult<i64> {
        let mut txn = self.begin_record(&record.external_id).await?;
        let record_id = txn.commit_snapshot(record, mapping).await?;
        txn.commit().await?;
        Ok(record_id)
    }

    // ---- Mappings ----

    /// Current target mapping of a record.
    #[instrument(skip(self))]
    pub async fn target_mapping(&self, external_id: &str) -> LedgerResult<Option<TargetMapping>> {
        let persistent_id: Option<String> =
            sqlx::query_scalar("SELECT persistent_id FROM target_mapping WHERE external_id = ?")
                .bind(external_id)
                .fetch_optional(self.db())
                .await?;

        Ok(persistent_id.map(|persistent_id| TargetMapping {
            external_id: external_id.to_string(),
            persistent_id,
        }))
    }

    /// Persist a freshly created mapping before any file is synced.
    ///
    /// Registering the same mapping twice is a no-op. A record can never be
    /// re-pointed, and a persistent id can never serve two records.
    #[instrument(skip(self, mapping), fields(external_id = %mapping.external_id, persistent_id = %mapping.persistent_id))]
    pub async fn register_mapping(&self, mapping: &TargetMapping) -> LedgerResult<()> {
        if let Some(existing) = self.target_mapping(&mapping.external_id).await? {
            if existing.persistent_id == mapping.persistent_id {
                return Ok(());
            }
            return Err(LedgerError::consistency(
                &mapping.external_id,
                format!(
                    "already mapped to {}, cannot remap to {}",
                    existing.persistent_id, mapping.persistent_id
                ),
            ));
        }

        let owner: Option<String> =
            sqlx::query_scalar("SELECT external_id FROM target_mapping WHERE persistent_id = ?")
                .bind(&mapping.persistent_id)
                .fetch_optional(self.db())
                .await?;
        if let Some(owner) = owner {
            return Err(LedgerError::consistency(
                &mapping.external_id,
                format!("{} is already mapped to {owner}", mapping.persistent_id),
            ));
        }

        sqlx::query(
            r"
            INSERT INTO target_mapping (external_id, persistent_id, record_id, created_at)
            VALUES (?, ?, NULL, ?)
            ",
        )
        .bind(&mapping.external_id)
        .bind(&mapping.persistent_id)
        .bind(Utc::now())
        .execute(self.db())
        .await?;

        self.note_write();
        debug!("Target mapping registered");
        Ok(())
    }

    // ---- Target files ----

    /// Record a file that now exists on the target.
    #[instrument(skip(self, file), fields(external_id = %file.external_id, identity = %file.identity))]
    pub async fn commit_file_outcome(&self, file: &TargetFile) -> LedgerResult<()> {
        let raw_payload = serde_json::to_string(&file.raw_payload)?;
        sqlx::query(
            r"
            INSERT INTO target_files
                (external_id, record_id, source_identity_key, target_file_id,
                 checksum_algorithm, checksum, raw_payload, uploaded_at)
            VALUES (
                ?1,
                (SELECT record_id FROM target_mapping WHERE external_id = ?1),
                ?2, ?3, ?4, ?5, ?6, ?7
            )
            ",
        )
        .bind(&file.external_id)
        .bind(file.identity.key())
        .bind(&file.target_file_id)
        .bind(file.checksum.as_ref().map(|d| d.algorithm.as_str()))
        .bind(file.checksum.as_ref().map(|d| d.value.as_str()))
        .bind(&raw_payload)
        .bind(Utc::now())
        .execute(self.db())
        .await?;

        self.note_write();
        Ok(())
    }

    /// Swap the row of a file replaced in place.
    #[instrument(skip(self, file), fields(external_id = %file.external_id, identity = %file.identity))]
    pub async fn replace_file_outcome(
        &self,
        old_target_file_id: &str,
        file: &TargetFile,
    ) -> LedgerResult<()> {
        let raw_payload = serde_json::to_string(&file.raw_payload)?;
        let mut tx = self.db().begin().await?;

        sqlx::query("DELETE FROM target_files WHERE external_id = ? AND target_file_id = ?")
            .bind(&file.external_id)
            .bind(old_target_file_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r"
            INSERT INTO target_files
                (external_id, record_id, source_identity_key, target_file_id,
                 checksum_algorithm, checksum, raw_payload, uploaded_at)
            VALUES (
                ?1,
                (SELECT record_id FROM target_mapping WHERE external_id = ?1),
                ?2, ?3, ?4, ?5, ?6, ?7
            )
            ",
        )
        .bind(&file.external_id)
        .bind(file.identity.key())
        .bind(&file.target_file_id)
        .bind(file.checksum.as_ref().map(|d| d.algorithm.as_str()))
        .bind(file.checksum.as_ref().map(|d| d.value.as_str()))
        .bind(&raw_payload)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.note_write();
        Ok(())
    }

    /// Forget every target row of one identity. Returns the number removed.
    #[instrument(skip(self, identity), fields(identity = %identity))]
    pub async fn remove_file_outcome(
        &self,
        external_id: &str,
        identity: &FileIdentity,
    ) -> LedgerResult<u64> {
        let removed = sqlx::query(
            "DELETE FROM target_files WHERE external_id = ? AND source_identity_key = ?",
        )
        .bind(external_id)
        .bind(identity.key())
        .execute(self.db())
        .await?
        .rows_affected();

        if removed > 0 {
            self.note_write();
        }
        Ok(removed)
    }

    /// Forget a single target row by its target file id.
    #[instrument(skip(self))]
    pub async fn remove_target_file(
        &self,
        external_id: &str,
        target_file_id: &str,
    ) -> LedgerResult<bool> {
        let removed = sqlx::query(
            "DELETE FROM target_files WHERE external_id = ? AND target_file_id = ?",
        )
        .bind(external_id)
        .bind(target_file_id)
        .execute(self.db())
        .await?
        .rows_affected();

        if removed > 0 {
            self.note_write();
        }
        Ok(removed > 0)
    }

    /// Files currently recorded as present on the target, oldest first.
    #[instrument(skip(self))]
    pub async fn file_outcomes(&self, external_id: &str) -> LedgerResult<Vec<TargetFile>> {
        let rows: Vec<TargetFileRow> = sqlx::query_as(
            r"
            SELECT external_id, source_identity_key, target_file_id,
                   checksum_algorithm, checksum, raw_payload
            FROM target_files
            WHERE external_id = ?
            ORDER BY id
            ",
        )
        .bind(external_id)
        .fetch_all(self.db())
        .await?;

        rows.into_iter().map(TargetFileRow::into_target_file).collect()
    }

    // ---- Failures ----

    /// Record (or re-record) a failed operation.
    ///
    /// A repeated failure for the same identity replaces the status and bumps
    /// the attempt counter.
    #[instrument(skip(self))]
    pub async fn record_failure(
        &self,
        external_id: &str,
        identity_key: &str,
        status: &str,
        permanent: bool,
    ) -> LedgerResult<()> {
        sqlx::query(
            r"
            INSERT INTO failed_operations
                (external_id, source_identity_key, status, permanent, attempts, recorded_at)
            VALUES (?, ?, ?, ?, 1, ?)
            ON CONFLICT (external_id, source_identity_key) DO UPDATE SET
                status = excluded.status,
                permanent = excluded.permanent,
                attempts = failed_operations.attempts + 1,
                recorded_at = excluded.recorded_at
            ",
        )
        .bind(external_id)
        .bind(identity_key)
        .bind(status)
        .bind(permanent)
        .bind(Utc::now())
        .execute(self.db())
        .await?;

        self.note_write();
        warn!(external_id, identity = identity_key, status, permanent, "Failure recorded");
        Ok(())
    }

    /// Clear a failure after a successful retry. Returns whether one existed.
    #[instrument(skip(self))]
    pub async fn clear_failure(&self, external_id: &str, identity_key: &str) -> LedgerResult<bool> {
        let removed = sqlx::query(
            "DELETE FROM failed_operations WHERE external_id = ? AND source_identity_key = ?",
        )
        .bind(external_id)
        .bind(identity_key)
        .execute(self.db())
        .await?
        .rows_affected();

        if removed > 0 {
            self.note_write();
        }
        Ok(removed > 0)
    }

    /// Outstanding failures of one record.
    #[instrument(skip(self))]
    pub async fn failures(&self, external_id: &str) -> LedgerResult<Vec<FailedOperation>> {
        let rows: Vec<FailureRow> = sqlx::query_as(
            r"
            SELECT external_id, source_identity_key, status, permanent, attempts
            FROM failed_operations
            WHERE external_id = ?
            ORDER BY recorded_at, source_identity_key
            ",
        )
        .bind(external_id)
        .fetch_all(self.db())
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Every outstanding failure in the ledger.
    pub async fn all_failures(&self) -> LedgerResult<Vec<FailedOperation>> {
        let rows: Vec<FailureRow> = sqlx::query_as(
            r"
            SELECT external_id, source_identity_key, status, permanent, attempts
            FROM failed_operations
            ORDER BY external_id, source_identity_key
            ",
        )
        .fetch_all(self.db())
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    // ---- Checkpoint ----

    /// Timestamp of the last completed poll cycle.
    pub async fn checkpoint(&self) -> LedgerResult<Option<DateTime<Utc>>> {
        let checked_at: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT checked_at FROM checkpoint ORDER BY id DESC LIMIT 1")
                .fetch_optional(self.db())
                .await?;
        Ok(checked_at)
    }

    /// Record a completed poll cycle.
    #[instrument(skip(self))]
    pub async fn advance_checkpoint(&self, checked_at: DateTime<Utc>) -> LedgerResult<()> {
        sqlx::query("INSERT INTO checkpoint (checked_at) VALUES (?)")
            .bind(checked_at)
            .execute(self.db())
            .await?;

        self.note_write();
        debug!("Checkpoint advanced");
        Ok(())
    }
}
