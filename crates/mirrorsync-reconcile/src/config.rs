//! Driver tuning knobs.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Largest file the target accepts: 3 GiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 3 * 1024 * 1024 * 1024;

/// Number of polled records at or above which a warning is logged.
pub const DEFAULT_WARN_THRESHOLD: usize = 15;

/// Configuration of a [`crate::ReconciliationDriver`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Files larger than this are never transferred.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,

    /// How many times to poll the target lock state before giving up.
    #[serde(default = "default_lock_wait_attempts")]
    pub lock_wait_attempts: u32,

    /// Pause between lock polls, in milliseconds.
    #[serde(default = "default_lock_wait_interval_ms")]
    pub lock_wait_interval_ms: u64,

    /// Classify and diff only. Nothing is written anywhere.
    #[serde(default)]
    pub dry_run: bool,

    /// External ids that are never processed.
    #[serde(default)]
    pub exclude: HashSet<String>,

    #[serde(default = "default_warn_threshold")]
    pub warn_threshold: usize,
}

fn default_max_upload_bytes() -> u64 {
    DEFAULT_MAX_UPLOAD_BYTES
}

fn default_lock_wait_attempts() -> u32 {
    10
}

fn default_lock_wait_interval_ms() -> u64 {
    5_000
}

fn default_warn_threshold() -> usize {
    DEFAULT_WARN_THRESHOLD
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
            lock_wait_attempts: default_lock_wait_attempts(),
            lock_wait_interval_ms: default_lock_wait_interval_ms(),
            dry_run: false,
            exclude: HashSet::new(),
            warn_threshold: default_warn_threshold(),
        }
    }
}

impl DriverConfig {
    /// Pause between lock polls.
    #[must_use]
    pub fn lock_wait_interval(&self) -> Duration {
        Duration::from_millis(self.lock_wait_interval_ms)
    }

    /// Whether a record is on the exclude list.
    #[must_use]
    pub fn is_excluded(&self, external_id: &str) -> bool {
        self.exclude.contains(external_id)
    }
}
