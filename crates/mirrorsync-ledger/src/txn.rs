//! Per-record commit scope.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use mirrorsync_core::{SourceRecord, TargetMapping};
use sqlx::{Sqlite, Transaction};
use tracing::{debug, instrument};

use crate::blob::SnapshotBlobRef;
use crate::error::{LedgerError, LedgerResult};

/// Transaction covering one record's Committing step.
///
/// The snapshot row, its file listing and the mapping binding become visible
/// together on [`RecordTxn::commit`]. Dropping the scope without committing
/// rolls everything back.
///
/// The ledger pool holds a single connection, so no other ledger call may be
/// awaited while a `RecordTxn` is open.
pub struct RecordTxn {
    tx: Transaction<'static, Sqlite>,
    external_id: String,
    writes: Arc<AtomicU64>,
    pending_writes: u64,
}

impl RecordTxn {
    pub(crate) fn new(
        tx: Transaction<'static, Sqlite>,
        external_id: String,
        writes: Arc<AtomicU64>,
    ) -> Self {
        Self {
            tx,
            external_id,
            writes,
            pending_writes: 0,
        }
    }

    /// External id this scope was opened for.
    #[must_use]
    pub fn external_id(&self) -> &str {
        &self.external_id
    }

    /// Append a new immutable snapshot and bind the mapping and the target
    /// files to it. Returns the new snapshot row id.
    #[instrument(skip_all, fields(external_id = %self.external_id))]
    pub async fn commit_snapshot(
        &mut self,
        record: &SourceRecord,
        mapping: &TargetMapping,
    ) -> LedgerResult<i64> {
        if record.external_id != self.external_id || mapping.external_id != self.external_id {
            return Err(LedgerError::consistency(
                &self.external_id,
                format!(
                    "commit scope received record {} with mapping for {}",
                    record.external_id, mapping.external_id
                ),
            ));
        }

        let current: Option<String> =
            sqlx::query_scalar("SELECT persistent_id FROM target_mapping WHERE external_id = ?")
                .bind(&self.external_id)
                .fetch_optional(&mut *self.tx)
                .await?;

        let now = Utc::now();
        match current {
            Some(existing) if existing != mapping.persistent_id => {
                return Err(LedgerError::consistency(
                    &self.external_id,
                    format!(
                        "record is mapped to {existing}, refusing to commit against {}",
                        mapping.persistent_id
                    ),
                ));
            }
            Some(_) => {}
            None => {
                sqlx::query(
                    r"
                    INSERT INTO target_mapping (external_id, persistent_id, record_id, created_at)
                    VALUES (?, ?, NULL, ?)
                    ",
                )
                .bind(&self.external_id)
                .bind(&mapping.persistent_id)
                .bind(now)
                .execute(&mut *self.tx)
                .await?;
            }
        }

        let snapshot_blob = serde_json::to_string(&SnapshotBlobRef::from(record))?;
        let mapping_blob = serde_json::to_string(mapping)?;
        let files_blob = serde_json::to_string(&record.files)?;

        let record_id = sqlx::query(
            r"
            INSERT INTO records
                (external_id, observed_mod_time, snapshot_blob, target_mapping_blob, committed_at)
            VALUES (?, ?, ?, ?, ?)
            ",
        )
        .bind(&self.external_id)
        .bind(&record.modified)
        .bind(&snapshot_blob)
        .bind(&mapping_blob)
        .bind(now)
        .execute(&mut *self.tx)
        .await?
        .last_insert_rowid();

        sqlx::query("INSERT INTO record_files (record_id, file_snapshot_blob) VALUES (?, ?)")
            .bind(record_id)
            .bind(&files_blob)
            .execute(&mut *self.tx)
            .await?;

        sqlx::query("UPDATE target_mapping SET record_id = ? WHERE external_id = ?")
            .bind(record_id)
            .bind(&self.external_id)
            .execute(&mut *self.tx)
            .await?;

        sqlx::query("UPDATE target_files SET record_id = ? WHERE external_id = ?")
            .bind(record_id)
            .bind(&self.external_id)
            .execute(&mut *self.tx)
            .await?;

        self.pending_writes += 1;
        debug!(record_id, files = record.files.len(), "Snapshot staged");
        Ok(record_id)
    }

    /// Make the staged snapshot durable.
    pub async fn commit(self) -> LedgerResult<()> {
        self.tx.commit().await?;
        self.writes.fetch_add(self.pending_writes, Ordering::Relaxed);
        Ok(())
    }

    /// Discard everything staged in this scope.
    pub async fn rollback(self) -> LedgerResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
