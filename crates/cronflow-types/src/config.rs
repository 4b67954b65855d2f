//! Global configuration, loaded from `config.toml` in the data directory.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the Cronflow process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Override for the SQLite database URL. When unset, the database lives
    /// in the data directory.
    pub database_url: Option<String>,
    pub integrity: IntegrityConfig,
}

/// Settings for the background integrity passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrityConfig {
    /// How often to run `reconcile_statuses` (seconds).
    pub reconcile_interval_secs: u64,
    /// Whether to run an orphan cleanup pass at process start.
    pub cleanup_orphans_on_start: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            integrity: IntegrityConfig::default(),
        }
    }
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: 300,
            cleanup_orphans_on_start: false,
        }
    }
}
