//! Daemon configuration from the environment, overridden by CLI flags.

use std::collections::HashSet;
use std::env::VarError;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use mirrorsync_client::ApiKey;
use mirrorsync_reconcile::DriverConfig;

use crate::cli::Cli;

pub const DEFAULT_SOURCE_URL: &str = "https://datadryad.org/api/v2";
pub const DEFAULT_LEDGER_FILE: &str = "mirrorsync.sqlite3";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("expected `text` or `json`, got `{other}`")),
        }
    }
}

/// Everything the daemon needs for one cycle.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub ledger_path: PathBuf,
    pub source_url: String,
    pub target_url: String,
    pub collection: String,
    pub api_key: ApiKey,
    /// Institutional filter for the change listing.
    pub affiliation: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    /// Contact used when no author lists an email address.
    pub contact: Option<(String, String)>,
    pub log_level: String,
    pub log_format: LogFormat,
    pub driver: DriverConfig,
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

fn required<F>(reader: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    match reader(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::MissingVar(key.to_string())),
    }
}

fn parsed<F, T>(reader: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Result<String, VarError>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match reader(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        _ => Ok(default),
    }
}

impl DaemonConfig {
    /// Load configuration from environment variables and CLI flags.
    pub fn from_env(cli: &Cli) -> Result<Self, ConfigError> {
        Self::resolve(cli, |key| std::env::var(key))
    }

    /// Load configuration from a custom variable reader.
    ///
    /// Tests supply variables this way instead of mutating the process
    /// environment.
    pub fn from_reader<F>(reader: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, VarError>,
    {
        Self::resolve(&Cli::default(), reader)
    }

    /// Layer CLI flags over `reader`.
    pub fn resolve<F>(cli: &Cli, reader: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, VarError>,
    {
        let ledger_path = match &cli.ledger {
            Some(path) => path.clone(),
            None => match reader("MIRRORSYNC_LEDGER_PATH") {
                Ok(path) if !path.trim().is_empty() => PathBuf::from(path.trim()),
                _ => reader("HOME")
                    .map(|home| PathBuf::from(home).join(DEFAULT_LEDGER_FILE))
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_LEDGER_FILE)),
            },
        };

        let source_url = reader("MIRRORSYNC_SOURCE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string());

        let target_url = match &cli.target_url {
            Some(url) => url.clone(),
            None => required(&reader, "MIRRORSYNC_TARGET_URL")?,
        };
        let collection = match &cli.collection {
            Some(collection) => collection.clone(),
            None => required(&reader, "MIRRORSYNC_TARGET_COLLECTION")?,
        };
        let key_var = cli.api_key_env.as_deref().unwrap_or("MIRRORSYNC_API_KEY");
        let api_key = ApiKey::new(required(&reader, key_var)?);
        let affiliation = match &cli.affiliation {
            Some(affiliation) => affiliation.clone(),
            None => required(&reader, "MIRRORSYNC_AFFILIATION")?,
        };

        let mut driver = DriverConfig {
            max_upload_bytes: parsed(
                &reader,
                "MIRRORSYNC_MAX_UPLOAD_BYTES",
                mirrorsync_reconcile::config::DEFAULT_MAX_UPLOAD_BYTES,
            )?,
            warn_threshold: parsed(
                &reader,
                "MIRRORSYNC_WARN_THRESHOLD",
                mirrorsync_reconcile::config::DEFAULT_WARN_THRESHOLD,
            )?,
            dry_run: cli.dry_run,
            exclude: cli.exclude.iter().cloned().collect::<HashSet<_>>(),
            ..DriverConfig::default()
        };
        if let Some(threshold) = cli.warn_threshold {
            driver.warn_threshold = threshold;
        }

        let contact = match (
            reader("MIRRORSYNC_CONTACT_NAME"),
            reader("MIRRORSYNC_CONTACT_EMAIL"),
        ) {
            (Ok(name), Ok(email)) if !email.trim().is_empty() => {
                Some((name.trim().to_string(), email.trim().to_string()))
            }
            _ => None,
        };

        Ok(Self {
            ledger_path,
            source_url,
            target_url,
            collection,
            api_key,
            affiliation,
            request_timeout_secs: parsed(&reader, "MIRRORSYNC_REQUEST_TIMEOUT_SECS", 100)?,
            max_retries: parsed(&reader, "MIRRORSYNC_MAX_RETRIES", 5)?,
            contact,
            log_level: cli
                .log_level
                .clone()
                .or_else(|| reader("MIRRORSYNC_LOG_LEVEL").ok())
                .unwrap_or_else(|| "info".to_string()),
            log_format: parsed(&reader, "MIRRORSYNC_LOG_FORMAT", LogFormat::Text)?,
            driver,
        })
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
