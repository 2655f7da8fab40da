//! Configuration for launchprepd.
//!
//! Loads settings from /etc/launchprep/config.toml or uses defaults. The
//! database path can be overridden with LAUNCHPREP_DB for local runs.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/launchprep/config.toml";

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Progression database location
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Interval between periodic reconciliation sweeps, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Interval between ledger drift checks, in seconds
    #[serde(default = "default_verify_interval")]
    pub verify_interval_secs: u64,

    /// Notification channel capacity
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,

    /// Tracing filter directive (overridden by RUST_LOG)
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("/var/lib/launchprep/progress.db")
}

fn default_sweep_interval() -> u64 {
    3600
}

fn default_verify_interval() -> u64 {
    6 * 3600
}

fn default_notification_capacity() -> usize {
    64
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            sweep_interval_secs: default_sweep_interval(),
            verify_interval_secs: default_verify_interval(),
            notification_capacity: default_notification_capacity(),
            log_filter: default_log_filter(),
        }
    }
}

impl DaemonConfig {
    /// Load from the default path, falling back to defaults when missing
    pub fn load() -> Self {
        Self::load_from(Path::new(CONFIG_PATH))
    }

    pub fn load_from(path: &Path) -> Self {
        let mut config = match fs::read_to_string(path) {
            Ok(raw) => match toml::from_str(&raw) {
                Ok(config) => {
                    info!("Loaded config from {}", path.display());
                    config
                }
                Err(err) => {
                    warn!("Invalid config at {}: {err}; using defaults", path.display());
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        };

        if let Ok(db) = std::env::var("LAUNCHPREP_DB") {
            config.db_path = PathBuf::from(db);
        }
        config
    }

    /// Persist the current configuration
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}
