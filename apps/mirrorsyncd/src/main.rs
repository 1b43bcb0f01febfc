//! mirrorsyncd: run one reconciliation cycle and exit.
//!
//! Exit status is 0 when the cycle completed (even if individual records or
//! files failed and were recorded for retry), 1 when the daemon could not
//! start, and 2 when the cycle was aborted by a fatal error.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use mirrorsync_client::{
    build_http_client, DatasetEnvelopeTransformer, HttpSourceClient, HttpTargetClient,
    RetryPolicy,
};
use mirrorsync_ledger::Ledger;
use mirrorsync_reconcile::{CycleSummary, ReconciliationDriver};

mod cli;
mod config;
mod error;
mod logging;

use cli::Cli;
use config::DaemonConfig;
use error::{DaemonError, EXIT_OK};

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match run(&cli).await {
        Ok(summary) => {
            if summary.has_failures() {
                warn!(
                    failed = summary.failed,
                    files_failed = summary.files_failed,
                    files_oversize = summary.files_oversize,
                    "Some records need attention; failures are recorded for the next cycle"
                );
            }
            ExitCode::from(EXIT_OK)
        }
        Err(e) => {
            match &e {
                DaemonError::Cycle(cycle) => error!(
                    external_id = cycle.external_id().unwrap_or("-"),
                    kind = %cycle.sync_error().kind(),
                    error = %cycle,
                    "Cycle aborted"
                ),
                // Logging may not be up yet.
                other => eprintln!("mirrorsyncd: {other}"),
            }
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: &Cli) -> Result<CycleSummary, DaemonError> {
    let config = DaemonConfig::from_env(cli)?;
    logging::init_logging(&config.log_level, config.log_format).map_err(DaemonError::Logging)?;

    info!(
        source = %config.source_url,
        target = %config.target_url,
        collection = %config.collection,
        ledger = %config.ledger_path.display(),
        dry_run = config.driver.dry_run,
        excluded = config.driver.exclude.len(),
        "Starting mirrorsyncd"
    );

    let driver = build_driver(config).await?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after the current record");
            on_signal.cancel();
        }
    });

    Ok(driver.run_cycle(&cancel).await?)
}

async fn build_driver(config: DaemonConfig) -> Result<ReconciliationDriver, DaemonError> {
    let ledger = Ledger::open(&config.ledger_path).await?;

    let http = build_http_client(config.request_timeout())?;
    let retry = RetryPolicy::new(config.max_retries, 1);

    let source = HttpSourceClient::new(&config.source_url, http.clone(), retry.clone())?
        .with_affiliation(config.affiliation.clone());
    let target = HttpTargetClient::new(
        &config.target_url,
        config.collection.clone(),
        config.api_key.clone(),
        http,
        retry,
    )?;
    let transformer = match &config.contact {
        Some((name, email)) => {
            DatasetEnvelopeTransformer::new().with_default_contact(name.clone(), email.clone())
        }
        None => DatasetEnvelopeTransformer::new(),
    };

    Ok(ReconciliationDriver::new(
        ledger,
        Arc::new(source),
        Arc::new(target),
        Arc::new(transformer),
        config.driver,
    ))
}
