//! # mirrorsync ledger
//!
//! SQLite-backed store of everything the reconciliation driver needs to
//! know between runs:
//!
//! - append-only record snapshots and their file listings
//! - the permanent target mapping of every mirrored record
//! - files currently present on the target, keyed by source identity
//! - failed operations awaiting a retry or manual attention
//! - the poll checkpoint
//!
//! ## Example
//!
//! ```rust,ignore
//! use mirrorsync_ledger::Ledger;
//!
//! let ledger = Ledger::open(Path::new("mirrorsync.sqlite3")).await?;
//! let since = ledger.checkpoint().await?;
//! ```

mod blob;
pub mod error;
pub mod ledger;
pub mod migrations;
pub mod pool;
pub mod txn;

pub use error::{LedgerError, LedgerResult};
pub use ledger::{Ledger, StoredSnapshot};
pub use pool::LedgerPool;
pub use txn::RecordTxn;
