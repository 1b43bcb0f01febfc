//! Record change classification.

use mirrorsync_core::{RecordStatus, SourceRecord};

/// Classify a freshly fetched record against its last committed snapshot.
///
/// The modification timestamp alone is not trusted: a payload that changed
/// under an unchanged timestamp is reported as [`RecordStatus::LastmodStale`]
/// rather than folded into `Identical`.
#[must_use]
pub fn classify(current: &SourceRecord, previous: Option<&SourceRecord>) -> RecordStatus {
    match previous {
        None => RecordStatus::New,
        Some(previous) if previous == current => RecordStatus::Identical,
        Some(previous) if previous.modified != current.modified => RecordStatus::Updated,
        Some(_) => RecordStatus::LastmodStale,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirrorsync_core::SourceFile;
    use serde_json::json;

    fn record(modified: &str, abstract_text: &str) -> SourceRecord {
        SourceRecord::new(
            "doi:10.5061/dryad.1",
            modified,
            json!({"title": "Beetles", "abstract": abstract_text}),
        )
    }

    #[test]
    fn test_no_previous_snapshot_is_new() {
        assert_eq!(classify(&record("t1", "a"), None), RecordStatus::New);
    }

    #[test]
    fn test_deep_equal_is_identical() {
        let current = record("t1", "a");
        assert_eq!(classify(&current, Some(&current.clone())), RecordStatus::Identical);
    }

    #[test]
    fn test_timestamp_change_is_updated() {
        assert_eq!(
            classify(&record("t2", "a"), Some(&record("t1", "a"))),
            RecordStatus::Updated
        );
        // Payload changes do not matter once the timestamp moved.
        assert_eq!(
            classify(&record("t2", "b"), Some(&record("t1", "a"))),
            RecordStatus::Updated
        );
    }

    #[test]
    fn test_payload_change_under_same_timestamp_is_lastmod_stale() {
        assert_eq!(
            classify(&record("t1", "revised abstract"), Some(&record("t1", "a"))),
            RecordStatus::LastmodStale
        );
    }

    #[test]
    fn test_file_list_change_under_same_timestamp_is_lastmod_stale() {
        let previous = record("t1", "a");
        let current = previous.clone().with_files(vec![SourceFile {
            download_url: "https://source.example/f/1".into(),
            name: "late.csv".into(),
            mime_type: "text/csv".into(),
            size: 5,
            description: None,
            digest: None,
        }]);
        assert_eq!(classify(&current, Some(&previous)), RecordStatus::LastmodStale);
    }
}
