//! Stable file identity.
//!
//! The source exposes no durable file identifiers: download URLs and even
//! its own numeric file ids change between polls. The only attributes that
//! are always present and stable are the file name, MIME type and size, so
//! those three form the identity key used everywhere files are matched.

use serde::{Deserialize, Serialize};

use crate::types::SourceFile;

/// Identity key stored for failures of the record metadata itself.
pub const METADATA_IDENTITY: &str = "<metadata>";

/// Identity of a file across polls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileIdentity {
    pub name: String,
    pub mime_type: String,
    pub size: u64,
}

impl FileIdentity {
    /// Derive the identity of a source file.
    ///
    /// This is the only place identity is computed. URLs, descriptions and
    /// digests never take part.
    #[must_use]
    pub fn of(file: &SourceFile) -> Self {
        Self {
            name: file.name.clone(),
            mime_type: file.mime_type.clone(),
            size: file.size,
        }
    }

    /// Ledger key for this identity.
    ///
    /// Rendered as a JSON array so names containing separators stay
    /// unambiguous.
    #[must_use]
    pub fn key(&self) -> String {
        serde_json::Value::Array(vec![
            self.name.clone().into(),
            self.mime_type.clone().into(),
            self.size.into(),
        ])
        .to_string()
    }

    /// Parse a ledger key produced by [`FileIdentity::key`].
    ///
    /// Returns `None` for the metadata sentinel and for malformed keys.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        let (name, mime_type, size): (String, String, u64) = serde_json::from_str(key).ok()?;
        Some(Self {
            name,
            mime_type,
            size,
        })
    }
}

impl std::fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}, {} bytes)", self.name, self.mime_type, self.size)
    }
}
