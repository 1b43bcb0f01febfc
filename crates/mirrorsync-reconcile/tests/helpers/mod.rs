//! In-memory collaborators for driver tests.
//!
//! Both fakes record every call so tests can assert on what reached the
//! source and the target.

#![allow(dead_code)]

pub mod fake_source;
pub mod fake_target;

use std::sync::Arc;

use mirrorsync_core::{Digest, SourceFile, SourceRecord, SyncResult, Transformer};
use mirrorsync_ledger::Ledger;
use mirrorsync_reconcile::{DriverConfig, ReconciliationDriver};
use serde_json::{json, Value};

pub use fake_source::FakeSource;
pub use fake_target::{FakeTarget, TargetCall};

pub const DOI: &str = "doi:10.5061/dryad.abc123";

/// Wraps source metadata into a dataset envelope.
pub struct EnvelopeTransformer;

impl Transformer for EnvelopeTransformer {
    fn to_target_metadata(&self, record: &SourceRecord) -> SyncResult<Value> {
        Ok(json!({"datasetVersion": {"metadata": record.metadata}}))
    }
}

/// Deterministic content of a file served from `url`. Different URLs give
/// different content even for short files.
pub fn generated_content(url: &str, size: u64) -> Vec<u8> {
    let seed = Digest::md5(url.as_bytes()).value;
    seed.bytes().cycle().take(size as usize).collect()
}

/// A file without a digest.
pub fn file(name: &str, size: u64) -> SourceFile {
    SourceFile {
        download_url: format!("https://source.example/v1/{name}"),
        name: name.to_string(),
        mime_type: "text/csv".to_string(),
        size,
        description: None,
        digest: None,
    }
}

/// A file carrying the correct MD5 of its generated content.
pub fn file_with_md5(name: &str, size: u64) -> SourceFile {
    let mut f = file(name, size);
    f.digest = Some(Digest::md5(&generated_content(&f.download_url, size)));
    f
}

/// Same identity, different content: served from another URL.
pub fn revised(file: &SourceFile, revision: &str) -> SourceFile {
    let mut f = file.clone();
    f.download_url = format!("https://source.example/{revision}/{}", file.name);
    f.digest = Some(Digest::md5(&generated_content(&f.download_url, f.size)));
    f
}

pub fn record(modified: &str, abstract_text: &str, files: Vec<SourceFile>) -> SourceRecord {
    SourceRecord::new(
        DOI,
        modified,
        json!({"title": "Beetle counts", "abstract": abstract_text}),
    )
    .with_files(files)
}

pub fn test_config() -> DriverConfig {
    DriverConfig {
        lock_wait_attempts: 3,
        lock_wait_interval_ms: 0,
        ..DriverConfig::default()
    }
}

/// Route driver logs to the test harness output.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("mirrorsync_reconcile=debug")
        .try_init();
}

pub struct Harness {
    pub source: Arc<FakeSource>,
    pub target: Arc<FakeTarget>,
    pub ledger: Ledger,
    pub driver: ReconciliationDriver,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: DriverConfig) -> Self {
        let ledger = Ledger::in_memory().await.expect("ledger");
        Self::with_ledger(ledger, Arc::new(FakeSource::default()), Arc::new(FakeTarget::default()), config)
    }

    pub fn with_ledger(
        ledger: Ledger,
        source: Arc<FakeSource>,
        target: Arc<FakeTarget>,
        config: DriverConfig,
    ) -> Self {
        init_test_logging();
        let driver = ReconciliationDriver::new(
            ledger.clone(),
            source.clone(),
            target.clone(),
            Arc::new(EnvelopeTransformer),
            config,
        );
        Self {
            source,
            target,
            ledger,
            driver,
        }
    }

    /// Same collaborators and ledger, different driver configuration.
    pub fn reconfigure(&self, config: DriverConfig) -> Self {
        Self::with_ledger(
            self.ledger.clone(),
            self.source.clone(),
            self.target.clone(),
            config,
        )
    }
}
