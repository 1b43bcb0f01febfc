//! Daemon errors and their exit codes.

use mirrorsync_client::ClientError;
use mirrorsync_ledger::LedgerError;
use mirrorsync_reconcile::CycleError;
use thiserror::Error;

/// Exit code for a completed cycle, recorded failures included.
pub const EXIT_OK: u8 = 0;
/// Exit code when the daemon could not start.
pub const EXIT_STARTUP: u8 = 1;
/// Exit code when a cycle was aborted.
pub const EXIT_ABORTED: u8 = 2;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("logging setup failed: {0}")]
    Logging(String),

    #[error("failed to open ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("failed to build client: {0}")]
    Client(#[from] ClientError),

    #[error(transparent)]
    Cycle(#[from] CycleError),
}

impl DaemonError {
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Cycle(_) => EXIT_ABORTED,
            _ => EXIT_STARTUP,
        }
    }
}
