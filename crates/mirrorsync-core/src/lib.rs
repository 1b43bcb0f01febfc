//! # mirrorsync core
//!
//! Shared domain model for mirroring records from a read-only source
//! repository into a writable target repository.
//!
//! This crate provides:
//! - Canonical record and file types ([`SourceRecord`], [`SourceFile`])
//! - Stable file identity derived from unstable source attributes ([`FileIdentity`])
//! - Digest handling for download and upload verification ([`Digest`])
//! - The typed error taxonomy shared by every other crate ([`SyncError`])
//! - Collaborator traits for the source, the target and the metadata transformer
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────────┐     ┌──────────────┐
//! │ SourceClient │────►│  Reconciliation  │────►│ TargetClient │
//! │  (read-only) │     │      Driver      │     │ (read/write) │
//! └──────────────┘     └────────┬─────────┘     └──────────────┘
//!                               │
//!                               ▼
//!                        ┌─────────────┐
//!                        │   Ledger    │
//!                        └─────────────┘
//! ```

pub mod digest;
pub mod error;
pub mod identity;
pub mod status;
pub mod traits;
pub mod types;

pub use digest::Digest;
pub use error::{ErrorKind, SyncError, SyncResult};
pub use identity::{FileIdentity, METADATA_IDENTITY};
pub use status::RecordStatus;
pub use traits::{SourceClient, TargetClient, Transformer};
pub use types::{
    FailedOperation, SourceFile, SourceRecord, TargetFile, TargetMapping, UploadMeta,
    UploadedFile,
};
