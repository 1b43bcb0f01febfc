//! # mirrorsync reconcile
//!
//! The reconciliation engine: decides what changed in each source record
//! and converges the target to match, recording every outcome in the
//! [`mirrorsync_ledger::Ledger`].
//!
//! - [`classify`]: four-way change status of a record
//! - [`diff_files`]: identity-stable add / delete / hash-change sets
//! - [`ReconciliationDriver`]: per-record state machine and poll cycle

pub mod classifier;
pub mod config;
pub mod diff;
pub mod driver;
pub mod error;
pub mod summary;

pub use classifier::classify;
pub use config::DriverConfig;
pub use diff::{diff_files, diff_for_status, FileDiff};
pub use driver::ReconciliationDriver;
pub use error::CycleError;
pub use summary::{CycleSummary, RecordReport, RecordState};
