use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use mirrorsync_core::{
    Digest, SyncError, SyncResult, TargetClient, UploadMeta, UploadedFile,
};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetCall {
    Validate,
    Create,
    Update(String),
    Upload(String, String),
    Replace(String, String),
    Delete(String),
    CheckLocks(String),
}

impl TargetCall {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::Validate | Self::CheckLocks(_))
    }
}

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub persistent_id: String,
    pub name: String,
    pub md5: Digest,
}

#[derive(Default)]
pub struct TargetState {
    pub records: BTreeMap<String, Value>,
    pub files: BTreeMap<String, StoredFile>,
    pub calls: Vec<TargetCall>,
    next_id: u64,
    pub reject_credentials: bool,
    pub auth_expired: bool,
    pub create_fails: bool,
    pub update_fails: bool,
    pub failing_uploads: HashSet<String>,
    pub failing_deletes: HashSet<String>,
    pub wrong_checksums: HashSet<String>,
    pub locked_checks: u32,
    pub always_locked: bool,
}

impl TargetState {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }

    fn guard(&self) -> SyncResult<()> {
        if self.auth_expired {
            return Err(SyncError::Auth("API token expired".into()));
        }
        Ok(())
    }

    fn store(&mut self, persistent_id: &str, content: &[u8], meta: &UploadMeta) -> UploadedFile {
        let id = self.next_id();
        let md5 = Digest::md5(content);
        let reported = if self.wrong_checksums.contains(&meta.name) {
            Digest::md5(b"garbled in transit")
        } else {
            md5.clone()
        };
        self.files.insert(
            id.clone(),
            StoredFile {
                persistent_id: persistent_id.to_string(),
                name: meta.name.clone(),
                md5,
            },
        );
        UploadedFile {
            target_file_id: id.clone(),
            checksum: Some(reported.clone()),
            raw: json!({
                "dataFile": {
                    "id": id,
                    "checksum": {"type": "MD5", "value": reported.value}
                }
            }),
        }
    }
}

/// Target keeping records and files in memory.
#[derive(Default)]
pub struct FakeTarget {
    state: Mutex<TargetState>,
}

impl FakeTarget {
    pub fn configure(&self, f: impl FnOnce(&mut TargetState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn calls(&self) -> Vec<TargetCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn mutations(&self) -> Vec<TargetCall> {
        self.calls().into_iter().filter(TargetCall::is_mutation).collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn count(&self, pred: impl Fn(&TargetCall) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    /// Sorted names of the files stored under a record.
    pub fn file_names(&self, persistent_id: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut names: Vec<String> = state
            .files
            .values()
            .filter(|f| f.persistent_id == persistent_id)
            .map(|f| f.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn record_count(&self) -> usize {
        self.state.lock().unwrap().records.len()
    }

    pub fn file(&self, target_file_id: &str) -> Option<StoredFile> {
        self.state.lock().unwrap().files.get(target_file_id).cloned()
    }
}

#[async_trait]
impl TargetClient for FakeTarget {
    async fn validate_credentials(&self) -> SyncResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(TargetCall::Validate);
        if state.reject_credentials {
            return Err(SyncError::Auth("invalid API token".into()));
        }
        Ok(())
    }

    async fn create_record(&self, payload: &Value) -> SyncResult<String> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(TargetCall::Create);
        state.guard()?;
        if state.create_fails {
            return Err(SyncError::transport("500 Internal Server Error"));
        }
        let pid = format!("doi:10.80240/FK2/{}", state.next_id());
        state.records.insert(pid.clone(), payload.clone());
        Ok(pid)
    }

    async fn update_record(&self, persistent_id: &str, payload: &Value) -> SyncResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(TargetCall::Update(persistent_id.to_string()));
        state.guard()?;
        if state.update_fails {
            return Err(SyncError::transport("502 Bad Gateway"));
        }
        match state.records.get_mut(persistent_id) {
            Some(existing) => {
                *existing = payload.clone();
                Ok(())
            }
            None => Err(SyncError::NotFound(persistent_id.to_string())),
        }
    }

    async fn upload_file(
        &self,
        persistent_id: &str,
        content: Vec<u8>,
        meta: &UploadMeta,
    ) -> SyncResult<UploadedFile> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(TargetCall::Upload(persistent_id.to_string(), meta.name.clone()));
        state.guard()?;
        if state.failing_uploads.contains(&meta.name) {
            return Err(SyncError::transport(format!("upload of {} timed out", meta.name)));
        }
        Ok(state.store(persistent_id, &content, meta))
    }

    async fn replace_file(
        &self,
        target_file_id: &str,
        content: Vec<u8>,
        meta: &UploadMeta,
    ) -> SyncResult<UploadedFile> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(TargetCall::Replace(target_file_id.to_string(), meta.name.clone()));
        state.guard()?;
        let old = state
            .files
            .remove(target_file_id)
            .ok_or_else(|| SyncError::NotFound(target_file_id.to_string()))?;
        Ok(state.store(&old.persistent_id, &content, meta))
    }

    async fn delete_file(&self, target_file_id: &str) -> SyncResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(TargetCall::Delete(target_file_id.to_string()));
        state.guard()?;
        let name = state.files.get(target_file_id).map(|f| f.name.clone());
        if name.is_some_and(|n| state.failing_deletes.contains(&n)) {
            return Err(SyncError::transport("delete rejected"));
        }
        state
            .files
            .remove(target_file_id)
            .map(|_| ())
            .ok_or_else(|| SyncError::NotFound(target_file_id.to_string()))
    }

    async fn check_locks(&self, persistent_id: &str) -> SyncResult<bool> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(TargetCall::CheckLocks(persistent_id.to_string()));
        if state.always_locked {
            return Ok(true);
        }
        if state.locked_checks > 0 {
            state.locked_checks -= 1;
            return Ok(true);
        }
        Ok(false)
    }
}
