//! The reconciliation driver.
//!
//! Drives each record through
//! `Fetching → Classifying → MetadataSync → FileSync → Committing`, isolating
//! failures at the smallest scope that contains them:
//!
//! - a failed file operation is recorded and the remaining files proceed;
//! - a failed record is recorded, left uncommitted and retried next cycle;
//! - only credential and storage failures abort the cycle.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use mirrorsync_core::{
    Digest, ErrorKind, FileIdentity, RecordStatus, SourceClient, SourceFile, SourceRecord,
    SyncError, SyncResult, TargetClient, TargetFile, TargetMapping, Transformer, UploadMeta,
    UploadedFile, METADATA_IDENTITY,
};
use mirrorsync_ledger::{Ledger, StoredSnapshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::classifier::classify;
use crate::config::DriverConfig;
use crate::diff::{diff_for_status, FileDiff};
use crate::error::CycleError;
use crate::summary::{CycleSummary, RecordReport, RecordState};

enum FileSyncOutcome {
    Completed,
    Locked,
}

/// Orchestrates one reconciliation cycle against a ledger.
pub struct ReconciliationDriver {
    ledger: Ledger,
    source: Arc<dyn SourceClient>,
    target: Arc<dyn TargetClient>,
    transformer: Arc<dyn Transformer>,
    config: DriverConfig,
}

impl ReconciliationDriver {
    pub fn new(
        ledger: Ledger,
        source: Arc<dyn SourceClient>,
        target: Arc<dyn TargetClient>,
        transformer: Arc<dyn Transformer>,
        config: DriverConfig,
    ) -> Self {
        Self {
            ledger,
            source,
            target,
            transformer,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    #[must_use]
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Run one poll cycle.
    ///
    /// Processes every record modified since the checkpoint plus every record
    /// with a retryable recorded failure. The checkpoint advances to the
    /// cycle's start time only when the cycle ran to completion outside dry
    /// run mode.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError`] only for conditions that make continuing
    /// pointless: a rejected credential, an unlistable source, an unavailable
    /// ledger. Per-record failures are reported in the summary instead.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<CycleSummary, CycleError> {
        let started_at = Utc::now();
        let mut summary = CycleSummary::new(started_at, self.config.dry_run);

        self.target
            .validate_credentials()
            .await
            .map_err(CycleError::Credentials)?;

        let since = self
            .ledger
            .checkpoint()
            .await
            .map_err(|e| CycleError::Ledger(e.into()))?;
        let (work, polled) = self.work_list(since).await?;
        summary.polled = count(work.len());

        info!(
            since = ?since,
            changed = polled,
            retries = work.len() - polled,
            due = work.len(),
            dry_run = self.config.dry_run,
            "Starting reconciliation cycle"
        );

        if polled >= self.config.warn_threshold {
            summary.large_batch = true;
            warn!(
                changed = polled,
                threshold = self.config.warn_threshold,
                "Unusually large number of records due for a check"
            );
        }

        for external_id in &work {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                warn!("Cycle cancelled between records; checkpoint not advanced");
                break;
            }

            if self.config.is_excluded(external_id) {
                summary.excluded += 1;
                info!(external_id = %external_id, "Skipping excluded record");
                continue;
            }

            match self.reconcile_record(external_id).await {
                Ok(report) => summary.record(&report),
                Err(source) => {
                    error!(
                        external_id = %external_id,
                        kind = %source.kind(),
                        error = %source,
                        "Fatal error, aborting cycle"
                    );
                    return Err(CycleError::Aborted {
                        external_id: external_id.clone(),
                        source,
                    });
                }
            }
        }

        if !summary.cancelled && !self.config.dry_run {
            self.ledger
                .advance_checkpoint(started_at)
                .await
                .map_err(|e| CycleError::Ledger(e.into()))?;
            summary.checkpoint_advanced = true;
        }

        summary.finish();
        summary.log();
        Ok(summary)
    }

    /// Records changed since `since`, followed by records awaiting a retry.
    async fn work_list(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<(Vec<String>, usize), CycleError> {
        let changed = self
            .source
            .changed_since(since)
            .await
            .map_err(CycleError::Listing)?;
        let polled = changed.len();

        let retries = self
            .ledger
            .all_failures()
            .await
            .map_err(|e| CycleError::Ledger(e.into()))?
            .into_iter()
            .filter(|f| !f.permanent)
            .map(|f| f.external_id);

        let mut seen = HashSet::new();
        let work = changed
            .into_iter()
            .chain(retries)
            .filter(|id| seen.insert(id.clone()))
            .collect();

        Ok((work, polled))
    }

    /// Reconcile a single record.
    ///
    /// Non-fatal errors are recorded against the record and reported as
    /// [`RecordState::Failed`]; only fatal errors are returned.
    #[instrument(skip(self))]
    pub async fn reconcile_record(&self, external_id: &str) -> SyncResult<RecordReport> {
        let mut report = RecordReport::new(external_id);

        match self.process_record(external_id, &mut report).await {
            Ok(()) => Ok(report),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                error!(
                    state = %report.state,
                    kind = %e.kind(),
                    error = %e,
                    "Record failed"
                );
                if !self.config.dry_run {
                    // A record that vanished upstream will not come back on retry.
                    let permanent = e.kind() == ErrorKind::NotFound;
                    let status = format!("{}: {e}", report.state);
                    self.ledger
                        .record_failure(external_id, METADATA_IDENTITY, &status, permanent)
                        .await?;
                }
                report.state = RecordState::Failed;
                Ok(report)
            }
        }
    }

    async fn process_record(&self, external_id: &str, report: &mut RecordReport) -> SyncResult<()> {
        let record = self.source.fetch_record(external_id).await?;
        let files = self.source.fetch_files(external_id).await?;
        let record = record.with_files(files);
        if record.external_id != external_id {
            return Err(SyncError::InvalidData(format!(
                "requested {external_id} but the source returned {}",
                record.external_id
            )));
        }

        enter(report, RecordState::Classifying);
        let previous = self.ledger.latest_snapshot(external_id).await?;
        let status = classify(&record, previous.as_ref().map(|s| &s.record));
        report.status = Some(status);

        let old_files = previous.as_ref().map_or(&[][..], |s| s.record.files.as_slice());
        let diff = diff_for_status(status, old_files, &record.files);
        info!(
            status = %status,
            files = record.files.len(),
            to_add = diff.to_add.len(),
            to_delete = diff.to_delete.len(),
            hash_change = diff.hash_change.len(),
            "Record classified"
        );
        if diff.ambiguous {
            warn!("Duplicate file identities in snapshot; replacing the whole file set");
        }

        if self.config.dry_run {
            report.files_added = count(diff.to_add.len());
            report.files_deleted = count(diff.to_delete.len());
            report.files_replaced = count(diff.hash_change.len());
            report.state = RecordState::Done;
            return Ok(());
        }

        if status == RecordStatus::Identical {
            let Some(previous) = previous else {
                return Err(SyncError::ledger_consistency(
                    external_id,
                    "identical record without a committed snapshot",
                ));
            };
            return self.retry_pending(&record, &previous.mapping, report).await;
        }

        enter(report, RecordState::MetadataSync);
        let mapping = self
            .sync_metadata(status, &record, previous.as_ref())
            .await?;

        enter(report, RecordState::FileSync);
        if let FileSyncOutcome::Locked = self
            .sync_files(&mapping, &diff, &record.files, report)
            .await?
        {
            return Err(self.locked_error(&mapping));
        }

        enter(report, RecordState::Committing);
        let mut txn = self.ledger.begin_record(external_id).await?;
        let record_id = txn.commit_snapshot(&record, &mapping).await?;
        txn.commit().await?;
        self.ledger
            .clear_failure(external_id, METADATA_IDENTITY)
            .await?;

        report.state = RecordState::Done;
        info!(
            record_id,
            persistent_id = %mapping.persistent_id,
            added = report.files_added,
            deleted = report.files_deleted,
            replaced = report.files_replaced,
            failed = report.files_failed,
            "Record committed"
        );
        Ok(())
    }

    /// Handle an `identical` record: nothing to do unless earlier file
    /// operations are still pending. No snapshot is committed either way.
    async fn retry_pending(
        &self,
        record: &SourceRecord,
        mapping: &TargetMapping,
        report: &mut RecordReport,
    ) -> SyncResult<()> {
        let pending = self.ledger.failures(&record.external_id).await?;
        let retryable = pending.iter().filter(|f| !f.permanent).count();
        if retryable == 0 {
            debug!("Record unchanged");
            report.state = RecordState::Done;
            return Ok(());
        }

        info!(retryable, "Record unchanged but has pending failures; retrying");
        enter(report, RecordState::FileSync);
        if let FileSyncOutcome::Locked = self
            .sync_files(mapping, &FileDiff::default(), &record.files, report)
            .await?
        {
            return Err(self.locked_error(mapping));
        }

        self.ledger
            .clear_failure(&record.external_id, METADATA_IDENTITY)
            .await?;
        report.state = RecordState::Done;
        Ok(())
    }

    async fn sync_metadata(
        &self,
        status: RecordStatus,
        record: &SourceRecord,
        previous: Option<&StoredSnapshot>,
    ) -> SyncResult<TargetMapping> {
        match (status, previous) {
            (RecordStatus::New, _) => {
                if let Some(mapping) = self.ledger.target_mapping(&record.external_id).await? {
                    info!(
                        persistent_id = %mapping.persistent_id,
                        "Target record exists from an interrupted run; resuming file sync"
                    );
                    return Ok(mapping);
                }

                let payload = self.transformer.to_target_metadata(record)?;
                let persistent_id = self.target.create_record(&payload).await?;
                let mapping = TargetMapping {
                    external_id: record.external_id.clone(),
                    persistent_id,
                };
                self.ledger.register_mapping(&mapping).await?;
                info!(persistent_id = %mapping.persistent_id, "Target record created");
                Ok(mapping)
            }
            (RecordStatus::Updated, Some(previous)) => {
                let payload = self.transformer.to_target_metadata(record)?;
                self.target
                    .update_record(&previous.mapping.persistent_id, &payload)
                    .await?;
                info!(persistent_id = %previous.mapping.persistent_id, "Target metadata updated");
                Ok(previous.mapping.clone())
            }
            (_, Some(previous)) => Ok(previous.mapping.clone()),
            (_, None) => Err(SyncError::ledger_consistency(
                &record.external_id,
                format!("status {status} without a committed snapshot"),
            )),
        }
    }

    /// Apply a diff, plus any pending retries, to the target.
    ///
    /// Failure rows are cleared once per identity at the end, and only for
    /// identities that saw no new failure during this pass.
    async fn sync_files(
        &self,
        mapping: &TargetMapping,
        diff: &FileDiff,
        current: &[SourceFile],
        report: &mut RecordReport,
    ) -> SyncResult<FileSyncOutcome> {
        let external_id = mapping.external_id.as_str();
        let failures = self.ledger.failures(external_id).await?;
        let outcomes = self.ledger.file_outcomes(external_id).await?;

        let current_identities: HashSet<FileIdentity> =
            current.iter().map(SourceFile::identity).collect();
        let mut rows_on_target: HashMap<FileIdentity, usize> = HashMap::new();
        for outcome in &outcomes {
            *rows_on_target.entry(outcome.identity.clone()).or_default() += 1;
        }

        let mut deletes: Vec<FileIdentity> = Vec::new();
        for file in &diff.to_delete {
            push_unique(&mut deletes, file.identity());
        }
        // Rows the source no longer lists, including uploads left behind by
        // an interrupted run that never reached a committed snapshot.
        for outcome in &outcomes {
            if !current_identities.contains(&outcome.identity) {
                push_unique(&mut deletes, outcome.identity.clone());
            }
        }

        let mut adds: Vec<&SourceFile> = diff.to_add.iter().collect();
        let mut replaces: Vec<&SourceFile> = diff.hash_change.iter().collect();
        let mut queued: HashSet<FileIdentity> = adds
            .iter()
            .chain(replaces.iter())
            .map(|f| f.identity())
            .collect();

        for failure in &failures {
            let Some(identity) = failure.identity() else {
                continue;
            };

            if current_identities.contains(&identity) {
                if failure.permanent || !queued.insert(identity.clone()) {
                    continue;
                }
                let matching: Vec<&SourceFile> =
                    current.iter().filter(|f| f.identity() == identity).collect();
                match rows_on_target.get(&identity).copied().unwrap_or(0) {
                    0 => adds.extend(matching),
                    1 if matching.len() == 1 => replaces.extend(matching),
                    _ => {
                        // Duplicates cannot be paired with target rows.
                        push_unique(&mut deletes, identity);
                        adds.extend(matching);
                    }
                }
            } else if !rows_on_target.contains_key(&identity) {
                // Gone from the source and never reached the target.
                self.ledger
                    .clear_failure(external_id, &failure.identity_key)
                    .await?;
            }
        }

        if deletes.is_empty() && adds.is_empty() && replaces.is_empty() {
            return Ok(FileSyncOutcome::Completed);
        }

        if !self.wait_for_unlock(&mapping.persistent_id).await? {
            return Ok(FileSyncOutcome::Locked);
        }

        let mut settled: HashSet<FileIdentity> = HashSet::new();
        let mut failed: HashSet<FileIdentity> = HashSet::new();

        for identity in &deletes {
            let done = self
                .delete_identity(external_id, identity, &outcomes, report)
                .await?;
            settle(&mut settled, &mut failed, identity.clone(), done);
        }

        let outcomes = if deletes.is_empty() {
            outcomes
        } else {
            self.ledger.file_outcomes(external_id).await?
        };
        let mut present: HashMap<FileIdentity, usize> = HashMap::new();
        for outcome in &outcomes {
            *present.entry(outcome.identity.clone()).or_default() += 1;
        }

        for file in replaces {
            let identity = file.identity();
            match outcomes.iter().find(|o| o.identity == identity) {
                Some(existing) => {
                    if let Some(n) = present.get_mut(&identity) {
                        *n = n.saturating_sub(1);
                    }
                    let done = self.replace_one(mapping, file, existing, report).await?;
                    settle(&mut settled, &mut failed, identity, done);
                }
                None => adds.push(file),
            }
        }

        for file in adds {
            let identity = file.identity();
            if failed.contains(&identity) {
                // Rows for this identity are in an unknown state until the retry.
                debug!(file = %identity, "Earlier operation failed, upload deferred to the retry");
                continue;
            }
            if let Some(n) = present.get_mut(&identity).filter(|n| **n > 0) {
                *n -= 1;
                debug!(file = %identity, "Already on target, not re-uploading");
                settled.insert(identity);
                continue;
            }
            let done = self.add_one(mapping, file, report).await?;
            settle(&mut settled, &mut failed, identity, done);
        }

        for identity in settled.difference(&failed) {
            self.ledger
                .clear_failure(external_id, &identity.key())
                .await?;
        }

        Ok(FileSyncOutcome::Completed)
    }

    /// Poll the target until the record is unlocked or attempts run out.
    async fn wait_for_unlock(&self, persistent_id: &str) -> SyncResult<bool> {
        let attempts = self.config.lock_wait_attempts.max(1);
        for attempt in 1..=attempts {
            match self.target.check_locks(persistent_id).await {
                Ok(false) => return Ok(true),
                Ok(true) => debug!(attempt, persistent_id, "Target record locked"),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(attempt, persistent_id, error = %e, "Lock check failed"),
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.lock_wait_interval()).await;
            }
        }
        Ok(false)
    }

    fn locked_error(&self, mapping: &TargetMapping) -> SyncError {
        SyncError::transport(format!(
            "target record {} still locked after {} checks",
            mapping.persistent_id,
            self.config.lock_wait_attempts.max(1)
        ))
    }

    async fn delete_identity(
        &self,
        external_id: &str,
        identity: &FileIdentity,
        outcomes: &[TargetFile],
        report: &mut RecordReport,
    ) -> SyncResult<bool> {
        let key = identity.key();
        let rows: Vec<&TargetFile> = outcomes.iter().filter(|o| &o.identity == identity).collect();

        if rows.is_empty() {
            // Its upload never succeeded, so there is nothing to remove.
            return Ok(true);
        }

        let mut deleted = Vec::with_capacity(rows.len());
        for row in &rows {
            match self.target.delete_file(&row.target_file_id).await {
                Ok(()) => deleted.push(row.target_file_id.as_str()),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(target_file_id = %row.target_file_id, "Already absent from target");
                    deleted.push(row.target_file_id.as_str());
                }
                Err(e) => {
                    self.fail_file(external_id, &key, e, report).await?;
                }
            }
        }

        let complete = deleted.len() == rows.len();
        if complete {
            self.ledger.remove_file_outcome(external_id, identity).await?;
        } else {
            for target_file_id in &deleted {
                self.ledger
                    .remove_target_file(external_id, target_file_id)
                    .await?;
            }
        }

        if !deleted.is_empty() {
            report.files_deleted += count(deleted.len());
            info!(file = %identity, removed = deleted.len(), "File deleted from target");
        }
        Ok(complete)
    }

    async fn add_one(
        &self,
        mapping: &TargetMapping,
        file: &SourceFile,
        report: &mut RecordReport,
    ) -> SyncResult<bool> {
        let external_id = mapping.external_id.as_str();
        let identity = file.identity();
        let key = identity.key();

        if self.skip_oversize(external_id, file, report).await? {
            return Ok(false);
        }

        let (content, local_md5) = match self.fetch_content(file).await {
            Ok(fetched) => fetched,
            Err(e) => return self.fail_file(external_id, &key, e, report).await,
        };

        let uploaded = match self
            .target
            .upload_file(&mapping.persistent_id, content, &UploadMeta::from(file))
            .await
        {
            Ok(uploaded) => uploaded,
            Err(e) => return self.fail_file(external_id, &key, e, report).await,
        };

        if let Err(mismatch) = verify_upload(file, &local_md5, &uploaded) {
            // Corrupt content must not stay on the target.
            if let Err(delete_err) = self.target.delete_file(&uploaded.target_file_id).await {
                if delete_err.is_fatal() {
                    return Err(delete_err);
                }
                error!(
                    target_file_id = %uploaded.target_file_id,
                    error = %delete_err,
                    "Could not remove mismatched upload"
                );
            }
            return self.fail_file(external_id, &key, mismatch, report).await;
        }

        self.ledger
            .commit_file_outcome(&TargetFile {
                external_id: external_id.to_string(),
                identity,
                target_file_id: uploaded.target_file_id,
                checksum: uploaded.checksum,
                raw_payload: uploaded.raw,
            })
            .await?;

        report.files_added += 1;
        info!(file = %file.name, size = file.size, "File uploaded");
        Ok(true)
    }

    async fn replace_one(
        &self,
        mapping: &TargetMapping,
        file: &SourceFile,
        existing: &TargetFile,
        report: &mut RecordReport,
    ) -> SyncResult<bool> {
        let external_id = mapping.external_id.as_str();
        let identity = file.identity();
        let key = identity.key();

        if let (Some(digest), Some(stored)) = (&file.digest, &existing.checksum) {
            if digest == stored {
                debug!(file = %identity, "Target already holds this content");
                return Ok(true);
            }
        }

        if self.skip_oversize(external_id, file, report).await? {
            return Ok(false);
        }

        let (content, local_md5) = match self.fetch_content(file).await {
            Ok(fetched) => fetched,
            Err(e) => return self.fail_file(external_id, &key, e, report).await,
        };

        let uploaded = match self
            .target
            .replace_file(&existing.target_file_id, content, &UploadMeta::from(file))
            .await
        {
            Ok(uploaded) => uploaded,
            Err(e) => return self.fail_file(external_id, &key, e, report).await,
        };

        let verified = verify_upload(file, &local_md5, &uploaded);
        self.ledger
            .replace_file_outcome(
                &existing.target_file_id,
                &TargetFile {
                    external_id: external_id.to_string(),
                    identity,
                    target_file_id: uploaded.target_file_id,
                    checksum: uploaded.checksum,
                    raw_payload: uploaded.raw,
                },
            )
            .await?;

        if let Err(mismatch) = verified {
            return self.fail_file(external_id, &key, mismatch, report).await;
        }

        report.files_replaced += 1;
        info!(file = %file.name, "File replaced in place");
        Ok(true)
    }

    /// Record a permanent oversize note instead of transferring the file.
    async fn skip_oversize(
        &self,
        external_id: &str,
        file: &SourceFile,
        report: &mut RecordReport,
    ) -> SyncResult<bool> {
        if file.size <= self.config.max_upload_bytes {
            return Ok(false);
        }

        let err = SyncError::SizeLimitExceeded {
            identity: file.identity().to_string(),
            size: file.size,
            limit: self.config.max_upload_bytes,
        };
        self.ledger
            .record_failure(external_id, &file.identity().key(), &format!("oversize: {err}"), true)
            .await?;
        report.files_oversize += 1;
        Ok(true)
    }

    /// Download a file and check it against the source digest.
    ///
    /// Returns the content with its MD5, which stands in as the expected
    /// target checksum when the source reports none.
    async fn fetch_content(&self, file: &SourceFile) -> SyncResult<(Vec<u8>, Digest)> {
        let content = self.source.download(file).await?;

        if let Some(expected) = &file.digest {
            match Digest::compute(&expected.algorithm, &content) {
                Some(actual) if &actual != expected => {
                    return Err(SyncError::identity_mismatch(file.identity(), expected, actual));
                }
                Some(_) => {}
                None => debug!(
                    algorithm = %expected.algorithm,
                    "Digest algorithm not supported locally, download unverified"
                ),
            }
        }

        let local_md5 = Digest::md5(&content);
        Ok((content, local_md5))
    }

    /// Record a non-fatal file failure. Always `Ok(false)` unless fatal.
    async fn fail_file(
        &self,
        external_id: &str,
        identity_key: &str,
        err: SyncError,
        report: &mut RecordReport,
    ) -> SyncResult<bool> {
        if err.is_fatal() {
            return Err(err);
        }
        let status = format!("{}: {err}", err.kind());
        self.ledger
            .record_failure(external_id, identity_key, &status, false)
            .await?;
        report.files_failed += 1;
        Ok(false)
    }
}

/// Compare the target's checksum with what was sent.
fn verify_upload(file: &SourceFile, local_md5: &Digest, uploaded: &UploadedFile) -> SyncResult<()> {
    let Some(reported) = &uploaded.checksum else {
        return Ok(());
    };

    let expected = match &file.digest {
        Some(digest) if digest.same_algorithm(reported) => digest,
        _ if local_md5.same_algorithm(reported) => local_md5,
        _ => return Ok(()),
    };

    if expected.value == reported.value {
        Ok(())
    } else {
        Err(SyncError::identity_mismatch(file.identity(), expected, reported))
    }
}

fn push_unique(identities: &mut Vec<FileIdentity>, identity: FileIdentity) {
    if !identities.contains(&identity) {
        identities.push(identity);
    }
}

fn settle(
    settled: &mut HashSet<FileIdentity>,
    failed: &mut HashSet<FileIdentity>,
    identity: FileIdentity,
    done: bool,
) {
    if done {
        settled.insert(identity);
    } else {
        failed.insert(identity);
    }
}

fn enter(report: &mut RecordReport, state: RecordState) {
    debug!(external_id = %report.external_id, from = %report.state, to = %state, "State transition");
    report.state = state;
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
