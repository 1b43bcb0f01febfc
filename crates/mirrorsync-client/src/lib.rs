//! # mirrorsync client
//!
//! `reqwest` bindings for the two repositories a mirror connects:
//!
//! - [`HttpSourceClient`]: read-only, paginated search and file listings
//! - [`HttpTargetClient`]: record create/update, multipart file upload and
//!   replace, file delete, lock inspection and credential validation
//!
//! Every request goes through a [`RetryPolicy`] and every failure is a
//! [`ClientError`], which converts into [`mirrorsync_core::SyncError`] at the
//! trait boundary.

pub mod auth;
pub mod error;
pub mod http;
pub mod retry;
pub mod source;
pub mod target;
pub mod transform;

pub use auth::ApiKey;
pub use error::{ClientError, ClientResult};
pub use http::build_http_client;
pub use retry::RetryPolicy;
pub use source::HttpSourceClient;
pub use target::HttpTargetClient;
pub use transform::DatasetEnvelopeTransformer;
