//! SQLite connection pool for the ledger.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tracing::info;

use crate::error::{LedgerError, LedgerResult};

/// Single-connection SQLite pool.
///
/// One connection serializes every write, which is the locking model the
/// ledger relies on: at most one reconciliation touches a ledger at a time.
#[derive(Debug, Clone)]
pub struct LedgerPool {
    inner: SqlitePool,
}

impl LedgerPool {
    /// Open (creating if needed) an on-disk ledger.
    pub async fn open(path: &Path) -> LedgerResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        info!(path = %path.display(), "Opening ledger");
        Self::connect_with(options).await
    }

    /// Open a private in-memory ledger. Contents vanish on drop.
    pub async fn in_memory() -> LedgerResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(LedgerError::ConnectionFailed)?
            .foreign_keys(true);
        Self::connect_with(options).await
    }

    async fn connect_with(options: SqliteConnectOptions) -> LedgerResult<Self> {
        // An in-memory database lives only as long as its connection, so the
        // one connection is never recycled.
        let inner = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(LedgerError::ConnectionFailed)?;
        Ok(Self { inner })
    }

    /// Underlying `SQLx` pool.
    #[must_use]
    pub fn inner(&self) -> &SqlitePool {
        &self.inner
    }
}
