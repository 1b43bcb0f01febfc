//! wiremock servers standing in for the source and target repositories.

#![allow(dead_code)]

use serde_json::{json, Value};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mirrorsync_client::{ApiKey, HttpSourceClient, HttpTargetClient, RetryPolicy};

use super::test_data::{API_KEY, DOI_ENCODED, PID};

/// Mock source API rooted at `/api/v2`.
pub struct MockSource {
    pub server: MockServer,
}

impl MockSource {
    pub async fn new() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn base_url(&self) -> String {
        format!("{}/api/v2", self.server.uri())
    }

    pub fn client(&self) -> HttpSourceClient {
        HttpSourceClient::new(&self.base_url(), reqwest::Client::new(), RetryPolicy::none())
            .unwrap()
    }

    pub fn client_with_retry(&self, retry: RetryPolicy) -> HttpSourceClient {
        HttpSourceClient::new(&self.base_url(), reqwest::Client::new(), retry).unwrap()
    }

    pub async fn mount_dataset(&self, body: Value) {
        Mock::given(method("GET"))
            .and(path(format!("/api/v2/datasets/{DOI_ENCODED}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_file_page(&self, version_id: u64, page: u32, body: Value) {
        Mock::given(method("GET"))
            .and(path(format!("/api/v2/versions/{version_id}/files")))
            .and(query_param("page", page.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_download(&self, id: u64, content: &[u8]) {
        Mock::given(method("GET"))
            .and(path(format!("/api/v2/files/{id}/download")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(content.to_vec()))
            .mount(&self.server)
            .await;
    }
}

/// Mock target native API.
pub struct MockTarget {
    pub server: MockServer,
}

impl MockTarget {
    pub async fn new() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn client(&self) -> HttpTargetClient {
        HttpTargetClient::new(
            &self.server.uri(),
            "ubc",
            ApiKey::new(API_KEY),
            reqwest::Client::new(),
            RetryPolicy::none(),
        )
        .unwrap()
    }

    pub fn client_with_retry(&self, retry: RetryPolicy) -> HttpTargetClient {
        HttpTargetClient::new(
            &self.server.uri(),
            "ubc",
            ApiKey::new(API_KEY),
            reqwest::Client::new(),
            retry,
        )
        .unwrap()
    }

    pub async fn mount_me(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path("/api/users/:me"))
            .and(header("X-Dataverse-key", API_KEY))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "status": if status == 200 { "OK" } else { "ERROR" },
                "message": "Bad api key",
                "data": {"identifier": "@mirror"}
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_locks(&self, locks: Value) {
        Mock::given(method("GET"))
            .and(path("/api/datasets/:persistentId/locks"))
            .and(query_param("persistentId", PID))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"status": "OK", "data": locks})),
            )
            .mount(&self.server)
            .await;
    }
}
