//! Content digests reported by the source and checksums reported by the target.

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

/// A digest value tagged with its algorithm.
///
/// Algorithm names are normalized to lower case without dashes or
/// underscores, so `MD5`, `md5` and `SHA-256`/`sha256` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest {
    pub algorithm: String,
    pub value: String,
}

impl Digest {
    /// Build a digest, returning `None` when either part is blank.
    ///
    /// Sources omit digests in several ways (missing key, empty string,
    /// `null`); all of them collapse to `None` here.
    #[must_use]
    pub fn new(algorithm: impl AsRef<str>, value: impl AsRef<str>) -> Option<Self> {
        let algorithm = normalize_algorithm(algorithm.as_ref());
        let value = value.as_ref().trim().to_ascii_lowercase();
        if algorithm.is_empty() || value.is_empty() {
            return None;
        }
        Some(Self { algorithm, value })
    }

    /// Build a digest from optional parts as they appear in upstream JSON.
    #[must_use]
    pub fn from_parts(algorithm: Option<&str>, value: Option<&str>) -> Option<Self> {
        match (algorithm, value) {
            (Some(a), Some(v)) => Self::new(a, v),
            _ => None,
        }
    }

    /// Hash `bytes` with the named algorithm.
    ///
    /// Returns `None` for algorithms this crate cannot compute.
    #[must_use]
    pub fn compute(algorithm: &str, bytes: &[u8]) -> Option<Self> {
        let algorithm = normalize_algorithm(algorithm);
        let value = match algorithm.as_str() {
            "md5" => format!("{:x}", md5::compute(bytes)),
            "sha256" => hex::encode(Sha256::digest(bytes)),
            _ => return None,
        };
        Some(Self { algorithm, value })
    }

    /// MD5 of `bytes`. Used as the expected checksum when the source has none.
    #[must_use]
    pub fn md5(bytes: &[u8]) -> Self {
        Self {
            algorithm: "md5".to_string(),
            value: format!("{:x}", md5::compute(bytes)),
        }
    }

    /// Whether both digests use the same algorithm.
    #[must_use]
    pub fn same_algorithm(&self, other: &Digest) -> bool {
        self.algorithm == other.algorithm
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.value)
    }
}

fn normalize_algorithm(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .collect::<String>()
        .to_ascii_lowercase()
}
