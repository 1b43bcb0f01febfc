//! HTTP binding for the downstream (Dataverse-style) repository.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info, instrument};
use url::Url;

use mirrorsync_core::{Digest, SyncResult, TargetClient, UploadMeta, UploadedFile};

use crate::auth::ApiKey;
use crate::error::{ClientError, ClientResult};
use crate::http::{check, endpoint, parse_base, read_json};
use crate::retry::RetryPolicy;

/// Extensions the target would otherwise unpack or convert to tabular data.
pub const INGEST_EXTENSIONS: &[&str] = &[
    ".sav", ".por", ".zip", ".csv", ".tsv", ".dta", ".rdata", ".xlsx", ".xls",
];

/// Suffix appended to file names whose ingest is suppressed.
pub const NO_PROCESS_SUFFIX: &str = ".NOPROCESS";

/// Name and MIME type to upload under.
///
/// Files the target would ingest are sent as opaque binaries under a
/// suffixed name so that their content and checksum are kept verbatim.
#[must_use]
pub fn upload_name_and_type(meta: &UploadMeta) -> (String, String) {
    let lower = meta.name.to_ascii_lowercase();
    let ingestible = meta.mime_type == "application/zip"
        || INGEST_EXTENSIONS.iter().any(|ext| lower.ends_with(ext));
    if ingestible {
        (
            format!("{}{NO_PROCESS_SUFFIX}", meta.name),
            "application/octet-stream".to_string(),
        )
    } else {
        (meta.name.clone(), meta.mime_type.clone())
    }
}

/// Parse `data.files[0].dataFile` from an add or replace response.
pub fn uploaded_file_from_response(body: &Value) -> ClientResult<UploadedFile> {
    let entry = body
        .pointer("/data/files/0")
        .ok_or_else(|| ClientError::InvalidResponse("upload response has no files".into()))?;
    let data_file = entry
        .get("dataFile")
        .ok_or_else(|| ClientError::InvalidResponse("upload response has no dataFile".into()))?;
    let target_file_id = match data_file.get("id") {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        _ => {
            return Err(ClientError::InvalidResponse(
                "upload response has no file id".into(),
            ))
        }
    };
    let checksum = Digest::from_parts(
        data_file.pointer("/checksum/type").and_then(Value::as_str),
        data_file.pointer("/checksum/value").and_then(Value::as_str),
    );
    Ok(UploadedFile {
        target_file_id,
        checksum,
        raw: entry.clone(),
    })
}

/// Read/write client for the target repository's native API.
#[derive(Debug, Clone)]
pub struct HttpTargetClient {
    base_url: Url,
    collection: String,
    key: ApiKey,
    http: Client,
    retry: RetryPolicy,
    suppress_ingest: bool,
}

impl HttpTargetClient {
    /// Create a client for `base_url` (e.g. `https://borealisdata.ca`) that
    /// creates new records in `collection`.
    pub fn new(
        base_url: &str,
        collection: impl Into<String>,
        key: ApiKey,
        http: Client,
        retry: RetryPolicy,
    ) -> ClientResult<Self> {
        let collection = collection.into();
        if collection.trim().is_empty() {
            return Err(ClientError::InvalidConfig("target collection is empty".into()));
        }
        if key.is_empty() {
            return Err(ClientError::InvalidConfig("API key is empty".into()));
        }
        Ok(Self {
            base_url: parse_base(base_url)?,
            collection,
            key,
            http,
            retry,
            suppress_ingest: true,
        })
    }

    /// Upload ingestible files under their own name and type.
    #[must_use]
    pub fn with_ingest(mut self) -> Self {
        self.suppress_ingest = false;
        self
    }

    fn url(&self, path: &str) -> String {
        endpoint(&self.base_url, path)
    }

    fn upload_form(&self, content: &[u8], meta: &UploadMeta, replace: bool) -> ClientResult<Form> {
        let (name, mime) = if self.suppress_ingest {
            upload_name_and_type(meta)
        } else {
            (meta.name.clone(), meta.mime_type.clone())
        };
        let mut json_data = json!({ "label": meta.name });
        if let Some(description) = &meta.description {
            json_data["description"] = Value::String(description.clone());
        }
        if replace {
            json_data["forceReplace"] = Value::Bool(true);
        }
        let part = Part::bytes(content.to_vec())
            .file_name(name)
            .mime_str(&mime)
            .map_err(|e| ClientError::InvalidConfig(format!("invalid MIME type {mime}: {e}")))?;
        Ok(Form::new()
            .part("file", part)
            .text("jsonData", json_data.to_string()))
    }

    async fn send_file(
        &self,
        operation: &str,
        url: &str,
        query: &[(&str, &str)],
        content: &[u8],
        meta: &UploadMeta,
        replace: bool,
    ) -> ClientResult<UploadedFile> {
        let body: Value = self
            .retry
            .execute(operation, || async {
                let form = self.upload_form(content, meta, replace)?;
                let request = self.key.apply(self.http.post(url).query(query));
                read_json(request.multipart(form).send().await?).await
            })
            .await?;
        uploaded_file_from_response(&body)
    }

    async fn validate(&self) -> ClientResult<()> {
        let url = self.url("api/users/:me");
        self.retry
            .execute("validate_credentials", || async {
                check(self.key.apply(self.http.get(&url)).send().await?).await?;
                Ok(())
            })
            .await
    }

    async fn create(&self, payload: &Value) -> ClientResult<String> {
        let url = self.url(&format!("api/dataverses/{}/datasets", self.collection));
        let body: Value = self
            .retry
            .execute("create_record", || async {
                read_json(self.key.apply(self.http.post(&url)).json(payload).send().await?).await
            })
            .await?;
        body.pointer("/data/persistentId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ClientError::InvalidResponse("create response has no persistentId".into()))
    }

    async fn update(&self, persistent_id: &str, payload: &Value) -> ClientResult<()> {
        let url = self.url("api/datasets/:persistentId/versions/:draft");
        let version = payload.get("datasetVersion").unwrap_or(payload);
        self.retry
            .execute("update_record", || async {
                let request = self
                    .key
                    .apply(self.http.put(&url).query(&[("persistentId", persistent_id)]));
                check(request.json(version).send().await?).await?;
                Ok(())
            })
            .await
    }

    async fn delete(&self, target_file_id: &str) -> ClientResult<()> {
        let url = self.url(&format!(
            "dvn/api/data-deposit/v1.1/swordv2/edit-media/file/{target_file_id}"
        ));
        self.retry
            .execute("delete_file", || async {
                check(self.key.apply_basic(self.http.delete(&url)).send().await?).await?;
                Ok(())
            })
            .await
    }

    async fn locks(&self, persistent_id: &str) -> ClientResult<Vec<Value>> {
        let url = self.url("api/datasets/:persistentId/locks");
        let body: Value = self
            .retry
            .execute("check_locks", || async {
                let request = self
                    .key
                    .apply(self.http.get(&url).query(&[("persistentId", persistent_id)]));
                read_json(request.send().await?).await
            })
            .await?;
        match body.get("data") {
            Some(Value::Array(locks)) => Ok(locks.clone()),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(other) => Err(ClientError::InvalidResponse(format!(
                "unexpected lock payload: {other}"
            ))),
        }
    }
}

#[async_trait]
impl TargetClient for HttpTargetClient {
    async fn validate_credentials(&self) -> SyncResult<()> {
        self.validate().await?;
        debug!(base_url = %self.base_url, "Credential accepted");
        Ok(())
    }

    #[instrument(skip(self, payload))]
    async fn create_record(&self, payload: &Value) -> SyncResult<String> {
        let persistent_id = self.create(payload).await?;
        info!(persistent_id = %persistent_id, collection = %self.collection, "Created target record");
        Ok(persistent_id)
    }

    #[instrument(skip(self, payload))]
    async fn update_record(&self, persistent_id: &str, payload: &Value) -> SyncResult<()> {
        Ok(self.update(persistent_id, payload).await?)
    }

    #[instrument(skip(self, content, meta), fields(name = %meta.name, bytes = content.len()))]
    async fn upload_file(
        &self,
        persistent_id: &str,
        content: Vec<u8>,
        meta: &UploadMeta,
    ) -> SyncResult<UploadedFile> {
        let url = self.url("api/datasets/:persistentId/add");
        let uploaded = self
            .send_file(
                "upload_file",
                &url,
                &[("persistentId", persistent_id)],
                &content,
                meta,
                false,
            )
            .await?;
        Ok(uploaded)
    }

    #[instrument(skip(self, content, meta), fields(name = %meta.name, bytes = content.len()))]
    async fn replace_file(
        &self,
        target_file_id: &str,
        content: Vec<u8>,
        meta: &UploadMeta,
    ) -> SyncResult<UploadedFile> {
        let url = self.url(&format!("api/files/{target_file_id}/replace"));
        let uploaded = self
            .send_file("replace_file", &url, &[], &content, meta, true)
            .await?;
        Ok(uploaded)
    }

    #[instrument(skip(self))]
    async fn delete_file(&self, target_file_id: &str) -> SyncResult<()> {
        Ok(self.delete(target_file_id).await?)
    }

    async fn check_locks(&self, persistent_id: &str) -> SyncResult<bool> {
        let locks = self.locks(persistent_id).await?;
        if !locks.is_empty() {
            debug!(persistent_id, locks = locks.len(), "Target record is locked");
        }
        Ok(!locks.is_empty())
    }
}
