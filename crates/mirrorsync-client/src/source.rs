//! HTTP binding for the upstream (Dryad-style) repository.
//!
//! Search results and file listings are paginated; both are flattened here
//! and every listed file is normalized into a [`SourceFile`] before it leaves
//! this module.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use mirrorsync_core::{Digest, SourceClient, SourceFile, SourceRecord, SyncResult};

use crate::error::{ClientError, ClientResult};
use crate::http::{check, endpoint, parse_base, read_json, resolve};
use crate::retry::RetryPolicy;

/// Records requested per search page.
pub const SEARCH_PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    total: Option<u64>,
    #[serde(default, rename = "_embedded")]
    embedded: SearchEmbedded,
}

#[derive(Debug, Default, Deserialize)]
struct SearchEmbedded {
    #[serde(default, rename = "stash:datasets")]
    datasets: Vec<DatasetRef>,
}

#[derive(Debug, Deserialize)]
struct DatasetRef {
    identifier: String,
}

#[derive(Debug, Deserialize)]
struct FilePage {
    #[serde(default)]
    total: Option<u64>,
    #[serde(default, rename = "_embedded")]
    embedded: FileEmbedded,
}

#[derive(Debug, Default, Deserialize)]
struct FileEmbedded {
    #[serde(default, rename = "stash:files")]
    files: Vec<RawFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFile {
    path: String,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    digest_type: Option<String>,
    #[serde(default)]
    digest: Option<String>,
    #[serde(rename = "_links")]
    links: FileLinks,
}

#[derive(Debug, Deserialize)]
struct FileLinks {
    #[serde(rename = "stash:file-download")]
    download: Href,
}

#[derive(Debug, Deserialize)]
struct Href {
    href: String,
}

/// Read-only client for the source repository's JSON API.
#[derive(Debug, Clone)]
pub struct HttpSourceClient {
    base_url: Url,
    http: Client,
    retry: RetryPolicy,
    affiliation: Option<String>,
}

impl HttpSourceClient {
    /// Create a client rooted at the API base, e.g. `https://datadryad.org/api/v2`.
    pub fn new(base_url: &str, http: Client, retry: RetryPolicy) -> ClientResult<Self> {
        Ok(Self {
            base_url: parse_base(base_url)?,
            http,
            retry,
            affiliation: None,
        })
    }

    /// Restrict change listings to one institution (a ROR identifier).
    #[must_use]
    pub fn with_affiliation(mut self, affiliation: impl Into<String>) -> Self {
        self.affiliation = Some(affiliation.into());
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> ClientResult<T> {
        self.retry
            .execute(operation, || async {
                debug!(url, "GET");
                let response = self.http.get(url).query(query).send().await?;
                read_json(response).await
            })
            .await
    }

    /// Raw dataset JSON for one record.
    pub async fn dataset(&self, external_id: &str) -> ClientResult<Value> {
        let encoded: String = url::form_urlencoded::byte_serialize(external_id.as_bytes()).collect();
        let url = endpoint(&self.base_url, &format!("datasets/{encoded}"));
        self.get_json("fetch_dataset", &url, &[]).await
    }

    /// One page of search results.
    async fn search_page(&self, since: Option<DateTime<Utc>>, page: u32) -> ClientResult<SearchPage> {
        let mut query = vec![
            ("page", page.to_string()),
            ("per_page", SEARCH_PAGE_SIZE.to_string()),
        ];
        if let Some(affiliation) = &self.affiliation {
            query.push(("affiliation", affiliation.clone()));
        }
        if let Some(since) = since {
            query.push((
                "modifiedSince",
                since.to_rfc3339_opts(SecondsFormat::Secs, true),
            ));
        }
        let url = endpoint(&self.base_url, "search");
        self.get_json("search", &url, &query).await
    }

    async fn list_changed(&self, since: Option<DateTime<Utc>>) -> ClientResult<Vec<String>> {
        let mut ids = Vec::new();
        let mut page = 1;
        loop {
            let result = self.search_page(since, page).await?;
            let count = result.embedded.datasets.len();
            ids.extend(result.embedded.datasets.into_iter().map(|d| d.identifier));
            let exhausted = result.total.is_some_and(|total| ids.len() as u64 >= total);
            if count == 0 || exhausted {
                break;
            }
            page += 1;
        }
        debug!(count = ids.len(), since = ?since, "Listed changed records");
        Ok(ids)
    }

    async fn list_files(&self, external_id: &str) -> ClientResult<Vec<SourceFile>> {
        let dataset = self.dataset(external_id).await?;
        let version = dataset
            .pointer("/_links/stash:version/href")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ClientError::InvalidResponse(format!("{external_id} has no version link"))
            })?;
        let files_url = endpoint(&resolve(&self.base_url, version)?, "files");

        let mut files = Vec::new();
        let mut page = 1;
        loop {
            let result: FilePage = self
                .get_json("list_files", &files_url, &[("page", page.to_string())])
                .await?;
            if result.embedded.files.is_empty() {
                break;
            }
            for raw in result.embedded.files {
                files.push(self.normalize(raw)?);
            }
            if result.total.is_some_and(|total| files.len() as u64 >= total) {
                break;
            }
            page += 1;
        }
        Ok(files)
    }

    /// Canonical form of one listed file.
    fn normalize(&self, raw: RawFile) -> ClientResult<SourceFile> {
        let download_url = resolve(&self.base_url, &raw.links.download.href)?;
        Ok(SourceFile {
            download_url: download_url.to_string(),
            name: raw.path,
            mime_type: raw
                .mime_type
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            size: raw.size,
            description: raw.description.filter(|d| !d.trim().is_empty()),
            digest: Digest::from_parts(raw.digest_type.as_deref(), raw.digest.as_deref()),
        })
    }
}

/// Build a [`SourceRecord`] from dataset JSON.
pub fn record_from_dataset(external_id: &str, dataset: Value) -> ClientResult<SourceRecord> {
    let modified = dataset
        .get("lastModificationDate")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ClientError::InvalidResponse(format!("{external_id} has no lastModificationDate"))
        })?
        .to_string();
    let identifier = dataset
        .get("identifier")
        .and_then(Value::as_str)
        .unwrap_or(external_id)
        .to_string();
    Ok(SourceRecord::new(identifier, modified, dataset))
}

#[async_trait]
impl SourceClient for HttpSourceClient {
    #[instrument(skip(self))]
    async fn changed_since(&self, since: Option<DateTime<Utc>>) -> SyncResult<Vec<String>> {
        Ok(self.list_changed(since).await?)
    }

    #[instrument(skip(self))]
    async fn fetch_record(&self, external_id: &str) -> SyncResult<SourceRecord> {
        let dataset = self.dataset(external_id).await?;
        Ok(record_from_dataset(external_id, dataset)?)
    }

    #[instrument(skip(self))]
    async fn fetch_files(&self, external_id: &str) -> SyncResult<Vec<SourceFile>> {
        Ok(self.list_files(external_id).await?)
    }

    #[instrument(skip(self, file), fields(name = %file.name, size = file.size))]
    async fn download(&self, file: &SourceFile) -> SyncResult<Vec<u8>> {
        let bytes = self
            .retry
            .execute("download", || async {
                let response = self.http.get(&file.download_url).send().await?;
                Ok(check(response).await?.bytes().await?)
            })
            .await?;
        Ok(bytes.to_vec())
    }
}
