//! Shared fixtures for ledger integration tests.

#![allow(dead_code)]

use mirrorsync_core::{Digest, SourceFile, SourceRecord, TargetFile, TargetMapping};
use mirrorsync_ledger::Ledger;
use serde_json::json;

pub const DOI: &str = "doi:10.5061/dryad.abc123";
pub const PID: &str = "doi:10.80240/FK2/XYZ";

pub async fn ledger() -> Ledger {
    Ledger::in_memory()
        .await
        .expect("in-memory ledger should open")
}

pub fn file(name: &str, size: u64) -> SourceFile {
    SourceFile {
        download_url: format!("https://source.example/files/{name}/download"),
        name: name.to_string(),
        mime_type: "text/csv".to_string(),
        size,
        description: None,
        digest: None,
    }
}

pub fn record(modified: &str, files: Vec<SourceFile>) -> SourceRecord {
    SourceRecord::new(
        DOI,
        modified,
        json!({"title": "Soil cores", "abstract": "Cores from the north plot"}),
    )
    .with_files(files)
}

pub fn mapping() -> TargetMapping {
    TargetMapping {
        external_id: DOI.to_string(),
        persistent_id: PID.to_string(),
    }
}

pub fn target_file(source: &SourceFile, target_file_id: &str, md5: &str) -> TargetFile {
    TargetFile {
        external_id: DOI.to_string(),
        identity: source.identity(),
        target_file_id: target_file_id.to_string(),
        checksum: Digest::new("MD5", md5),
        raw_payload: json!({"dataFile": {"id": target_file_id}}),
    }
}
