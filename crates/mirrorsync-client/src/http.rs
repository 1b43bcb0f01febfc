//! Request plumbing shared by the source and target clients.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::warn;
use url::Url;

use crate::error::{ClientError, ClientResult};

const USER_AGENT: &str = concat!("mirrorsync/", env!("CARGO_PKG_VERSION"));

/// Build the HTTP client used for every request.
pub fn build_http_client(timeout: Duration) -> ClientResult<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ClientError::InvalidConfig(format!("failed to build HTTP client: {e}")))
}

/// Parse a base URL, dropping any trailing slash.
pub(crate) fn parse_base(raw: &str) -> ClientResult<Url> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ClientError::InvalidConfig("base URL is empty".into()));
    }
    Ok(Url::parse(trimmed)?)
}

/// `base` joined with `path`, keeping the base path prefix.
pub(crate) fn endpoint(base: &Url, path: &str) -> String {
    format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Resolve an href that is either absolute or host-relative.
pub(crate) fn resolve(base: &Url, href: &str) -> ClientResult<Url> {
    Ok(base.join(href)?)
}

/// Pass successful responses through; map everything else to an error.
pub(crate) async fn check(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let url = response.url().clone();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<no body>".to_string());

    match status {
        StatusCode::NOT_FOUND => Err(ClientError::NotFound(url.to_string())),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ClientError::AuthError(format!(
            "{} from {}: {}",
            status.as_u16(),
            url.path(),
            remote_message(&body)
        ))),
        StatusCode::TOO_MANY_REQUESTS => {
            warn!(url = %url, retry_after_secs = ?retry_after, "Rate limited");
            Err(ClientError::RateLimited {
                retry_after_secs: retry_after,
            })
        }
        _ => Err(ClientError::Status {
            status: status.as_u16(),
            detail: if body.is_empty() {
                format!("HTTP {status}")
            } else {
                remote_message(&body)
            },
        }),
    }
}

/// Check the status and decode the JSON body.
pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
    let body = check(response).await?.text().await?;
    serde_json::from_str(&body)
        .map_err(|e| ClientError::InvalidResponse(format!("failed to parse response: {e}")))
}

/// The `message` field of a JSON error body, or the body itself.
fn remote_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}
