//! Embedded ledger schema migrations.

use crate::error::{LedgerError, LedgerResult};
use crate::pool::LedgerPool;

/// Run all pending ledger migrations.
///
/// Migrations are embedded at compile time from the `migrations/` directory.
///
/// # Errors
///
/// Returns `LedgerError::MigrationFailed` if any migration fails to apply.
pub async fn run_migrations(pool: &LedgerPool) -> LedgerResult<()> {
    tracing::debug!("Running ledger migrations");

    sqlx::migrate!("./migrations")
        .run(pool.inner())
        .await
        .map_err(LedgerError::MigrationFailed)?;

    Ok(())
}
