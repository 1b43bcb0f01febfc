//! Integration tests for the SQLite ledger.

mod common;

use chrono::{Duration, Utc};
use common::{file, ledger, mapping, record, target_file, DOI, PID};
use mirrorsync_core::{TargetMapping, METADATA_IDENTITY};
use mirrorsync_ledger::{Ledger, LedgerError};

#[tokio::test]
async fn test_empty_ledger() {
    let ledger = ledger().await;

    assert!(ledger.latest_snapshot(DOI).await.unwrap().is_none());
    assert!(ledger.latest_file_snapshot(DOI).await.unwrap().is_empty());
    assert!(ledger.target_mapping(DOI).await.unwrap().is_none());
    assert!(ledger.checkpoint().await.unwrap().is_none());
    assert_eq!(ledger.write_count(), 0);
}

#[tokio::test]
async fn test_commit_record_round_trip() {
    let ledger = ledger().await;
    let rec = record("2024-03-01T10:00:00Z", vec![file("a.csv", 100)]);

    let record_id = ledger.commit_record(&rec, &mapping()).await.unwrap();

    let stored = ledger.latest_snapshot(DOI).await.unwrap().unwrap();
    assert_eq!(stored.record_id, record_id);
    assert_eq!(stored.record, rec);
    assert_eq!(stored.mapping, mapping());
    assert_eq!(ledger.latest_file_snapshot(DOI).await.unwrap(), rec.files);
    assert_eq!(ledger.target_mapping(DOI).await.unwrap(), Some(mapping()));
}

#[tokio::test]
async fn test_snapshot_history_is_append_only() {
    let ledger = ledger().await;
    let first = record("2024-03-01T10:00:00Z", vec![file("a.csv", 100)]);
    let second = record("2024-04-01T10:00:00Z", vec![file("b.csv", 200)]);

    let first_id = ledger.commit_record(&first, &mapping()).await.unwrap();
    let second_id = ledger.commit_record(&second, &mapping()).await.unwrap();
    assert!(second_id > first_id);

    let rows: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM records WHERE external_id = ?")
        .bind(DOI)
        .fetch_one(ledger.pool().inner())
        .await
        .unwrap();
    assert_eq!(rows.0, 2);

    let stored = ledger.latest_snapshot(DOI).await.unwrap().unwrap();
    assert_eq!(stored.record, second);

    let old_blob: (String,) =
        sqlx::query_as("SELECT observed_mod_time FROM records WHERE id = ?")
            .bind(first_id)
            .fetch_one(ledger.pool().inner())
            .await
            .unwrap();
    assert_eq!(old_blob.0, "2024-03-01T10:00:00Z");
}

#[tokio::test]
async fn test_register_mapping_is_idempotent() {
    let ledger = ledger().await;

    ledger.register_mapping(&mapping()).await.unwrap();
    let writes = ledger.write_count();
    ledger.register_mapping(&mapping()).await.unwrap();

    assert_eq!(ledger.write_count(), writes);
    assert_eq!(ledger.target_mapping(DOI).await.unwrap(), Some(mapping()));
    // A registered mapping alone is not a snapshot.
    assert!(ledger.latest_snapshot(DOI).await.unwrap().is_none());
}

#[tokio::test]
async fn test_mapping_cannot_be_superseded() {
    let ledger = ledger().await;
    ledger.register_mapping(&mapping()).await.unwrap();

    let other = TargetMapping {
        external_id: DOI.to_string(),
        persistent_id: "doi:10.80240/FK2/OTHER".to_string(),
    };
    let err = ledger.register_mapping(&other).await.unwrap_err();
    assert!(err.is_consistency_error());

    let rec = record("2024-03-01T10:00:00Z", vec![]);
    let err = ledger.commit_record(&rec, &other).await.unwrap_err();
    assert!(matches!(err, LedgerError::Consistency { .. }));

    // The rejected commit left no snapshot behind.
    assert!(ledger.latest_snapshot(DOI).await.unwrap().is_none());
}

#[tokio::test]
async fn test_persistent_id_serves_one_record() {
    let ledger = ledger().await;
    ledger.register_mapping(&mapping()).await.unwrap();

    let squatter = TargetMapping {
        external_id: "doi:10.5061/dryad.other".to_string(),
        persistent_id: PID.to_string(),
    };
    let err = ledger.register_mapping(&squatter).await.unwrap_err();
    assert!(err.is_consistency_error());
}

#[tokio::test]
async fn test_dropped_record_txn_rolls_back() {
    let ledger = ledger().await;
    let rec = record("2024-03-01T10:00:00Z", vec![file("a.csv", 100)]);

    {
        let mut txn = ledger.begin_record(DOI).await.unwrap();
        txn.commit_snapshot(&rec, &mapping()).await.unwrap();
        // Dropped without commit.
    }

    assert!(ledger.latest_snapshot(DOI).await.unwrap().is_none());
    assert!(ledger.target_mapping(DOI).await.unwrap().is_none());
    assert_eq!(ledger.write_count(), 0);
}

#[tokio::test]
async fn test_explicit_rollback_discards_and_releases_connection() {
    let ledger = ledger().await;
    let rec = record("2024-03-01T10:00:00Z", vec![file("a.csv", 100)]);

    let mut txn = ledger.begin_record(DOI).await.unwrap();
    txn.commit_snapshot(&rec, &mapping()).await.unwrap();
    txn.rollback().await.unwrap();

    assert!(ledger.latest_snapshot(DOI).await.unwrap().is_none());
    assert_eq!(ledger.write_count(), 0);

    let mut txn = ledger.begin_record(DOI).await.unwrap();
    let record_id = txn.commit_snapshot(&rec, &mapping()).await.unwrap();
    txn.commit().await.unwrap();
    assert_eq!(
        ledger.latest_snapshot(DOI).await.unwrap().unwrap().record_id,
        record_id
    );
}

#[tokio::test]
async fn test_missing_mapping_is_reported() {
    let ledger = ledger().await;
    let rec = record("2024-03-01T10:00:00Z", vec![]);
    ledger.commit_record(&rec, &mapping()).await.unwrap();

    sqlx::query("DELETE FROM target_mapping")
        .execute(ledger.pool().inner())
        .await
        .unwrap();

    let err = ledger.latest_snapshot(DOI).await.unwrap_err();
    assert!(err.is_consistency_error());
}

#[tokio::test]
async fn test_file_outcomes_bind_to_committed_record() {
    let ledger = ledger().await;
    let a = file("a.csv", 100);
    let b = file("b.csv", 200);

    ledger.register_mapping(&mapping()).await.unwrap();
    ledger
        .commit_file_outcome(&target_file(&a, "11", "aaa"))
        .await
        .unwrap();
    ledger
        .commit_file_outcome(&target_file(&b, "12", "bbb"))
        .await
        .unwrap();

    let outcomes = ledger.file_outcomes(DOI).await.unwrap();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].identity, a.identity());
    assert_eq!(outcomes[0].checksum.as_ref().unwrap().algorithm, "md5");

    let record_id = ledger
        .commit_record(&record("2024-03-01T10:00:00Z", vec![a, b]), &mapping())
        .await
        .unwrap();

    let unbound: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM target_files WHERE record_id IS NULL OR record_id != ?",
    )
    .bind(record_id)
    .fetch_one(ledger.pool().inner())
    .await
    .unwrap();
    assert_eq!(unbound.0, 0);
}

#[tokio::test]
async fn test_remove_and_replace_file_outcomes() {
    let ledger = ledger().await;
    let a = file("a.csv", 100);
    let b = file("b.csv", 200);
    ledger.register_mapping(&mapping()).await.unwrap();
    ledger.commit_file_outcome(&target_file(&a, "11", "aaa")).await.unwrap();
    ledger.commit_file_outcome(&target_file(&b, "12", "bbb")).await.unwrap();

    assert_eq!(ledger.remove_file_outcome(DOI, &a.identity()).await.unwrap(), 1);
    assert_eq!(ledger.remove_file_outcome(DOI, &a.identity()).await.unwrap(), 0);

    ledger
        .replace_file_outcome("12", &target_file(&b, "13", "ccc"))
        .await
        .unwrap();
    let outcomes = ledger.file_outcomes(DOI).await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].target_file_id, "13");
    assert_eq!(outcomes[0].checksum.as_ref().unwrap().value, "ccc");

    assert!(ledger.remove_target_file(DOI, "13").await.unwrap());
    assert!(!ledger.remove_target_file(DOI, "13").await.unwrap());
    assert!(ledger.file_outcomes(DOI).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failure_upsert_counts_attempts() {
    let ledger = ledger().await;
    let key = file("a.csv", 100).identity().key();

    ledger.record_failure(DOI, &key, "timeout", false).await.unwrap();
    ledger.record_failure(DOI, &key, "connection reset", false).await.unwrap();
    ledger
        .record_failure(DOI, METADATA_IDENTITY, "create failed", false)
        .await
        .unwrap();

    let failures = ledger.failures(DOI).await.unwrap();
    assert_eq!(failures.len(), 2);
    let file_failure = failures.iter().find(|f| f.identity_key == key).unwrap();
    assert_eq!(file_failure.attempts, 2);
    assert_eq!(file_failure.status, "connection reset");
    assert!(!file_failure.permanent);
    assert!(file_failure.identity().is_some());

    assert!(ledger.clear_failure(DOI, &key).await.unwrap());
    assert!(!ledger.clear_failure(DOI, &key).await.unwrap());
    assert_eq!(ledger.failures(DOI).await.unwrap().len(), 1);
    assert_eq!(ledger.all_failures().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_checkpoint_latest_wins() {
    let ledger = ledger().await;
    let earlier = Utc::now() - Duration::hours(2);
    let later = Utc::now();

    ledger.advance_checkpoint(earlier).await.unwrap();
    ledger.advance_checkpoint(later).await.unwrap();

    let checkpoint = ledger.checkpoint().await.unwrap().unwrap();
    assert_eq!(checkpoint.timestamp_micros(), later.timestamp_micros());
}

#[tokio::test]
async fn test_on_disk_ledger_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.sqlite3");
    let rec = record("2024-03-01T10:00:00Z", vec![file("a.csv", 100)]);

    {
        let ledger = Ledger::open(&path).await.unwrap();
        ledger.commit_record(&rec, &mapping()).await.unwrap();
        ledger.pool().inner().close().await;
    }

    let reopened = Ledger::open(&path).await.unwrap();
    let stored = reopened.latest_snapshot(DOI).await.unwrap().unwrap();
    assert_eq!(stored.record, rec);
}
