//! Target repository credential.

use reqwest::RequestBuilder;

/// Header carrying the API key on native API calls.
pub const API_KEY_HEADER: &str = "X-Dataverse-key";

/// API key for the target repository.
///
/// The key never appears in `Debug` output or logs.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Whether the key is blank.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Attach the key as a header, as the native API expects.
    pub fn apply(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header(API_KEY_HEADER, &self.0)
    }

    /// Attach the key as the basic-auth user with an empty password, as the
    /// deposit API expects.
    pub fn apply_basic(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.basic_auth(&self.0, Some(""))
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ApiKey").field(&"[REDACTED]").finish()
    }
}
