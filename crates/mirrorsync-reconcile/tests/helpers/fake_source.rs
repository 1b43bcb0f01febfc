use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mirrorsync_core::{SourceClient, SourceFile, SourceRecord, SyncError, SyncResult};

use super::generated_content;

#[derive(Default)]
pub struct SourceState {
    pub records: BTreeMap<String, SourceRecord>,
    /// When set, returned by `changed_since` instead of every record id.
    pub changed: Option<Vec<String>>,
    pub missing: HashSet<String>,
    pub failing_downloads: HashSet<String>,
    pub corrupt_downloads: HashSet<String>,
    pub listing_fails: bool,
    pub since_seen: Vec<Option<DateTime<Utc>>>,
    pub downloads: Vec<String>,
}

/// Source serving records from memory.
#[derive(Default)]
pub struct FakeSource {
    state: Mutex<SourceState>,
}

impl FakeSource {
    pub fn publish(&self, record: SourceRecord) {
        self.configure(|s| {
            s.records.insert(record.external_id.clone(), record);
        });
    }

    pub fn configure(&self, f: impl FnOnce(&mut SourceState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn downloads(&self) -> Vec<String> {
        self.state.lock().unwrap().downloads.clone()
    }

    pub fn since_seen(&self) -> Vec<Option<DateTime<Utc>>> {
        self.state.lock().unwrap().since_seen.clone()
    }
}

#[async_trait]
impl SourceClient for FakeSource {
    async fn changed_since(&self, since: Option<DateTime<Utc>>) -> SyncResult<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state.since_seen.push(since);
        if state.listing_fails {
            return Err(SyncError::transport("search unavailable"));
        }
        Ok(state
            .changed
            .clone()
            .unwrap_or_else(|| state.records.keys().cloned().collect()))
    }

    async fn fetch_record(&self, external_id: &str) -> SyncResult<SourceRecord> {
        let state = self.state.lock().unwrap();
        if state.missing.contains(external_id) {
            return Err(SyncError::NotFound(external_id.to_string()));
        }
        let record = state
            .records
            .get(external_id)
            .ok_or_else(|| SyncError::NotFound(external_id.to_string()))?;
        Ok(SourceRecord::new(
            record.external_id.clone(),
            record.modified.clone(),
            record.metadata.clone(),
        ))
    }

    async fn fetch_files(&self, external_id: &str) -> SyncResult<Vec<SourceFile>> {
        let state = self.state.lock().unwrap();
        state
            .records
            .get(external_id)
            .map(|r| r.files.clone())
            .ok_or_else(|| SyncError::NotFound(external_id.to_string()))
    }

    async fn download(&self, file: &SourceFile) -> SyncResult<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        state.downloads.push(file.name.clone());
        if state.failing_downloads.contains(&file.name) {
            return Err(SyncError::transport(format!("connection reset fetching {}", file.name)));
        }
        let mut content = generated_content(&file.download_url, file.size);
        if state.corrupt_downloads.contains(&file.name) {
            if let Some(first) = content.first_mut() {
                *first ^= 0xff;
            }
        }
        Ok(content)
    }
}
