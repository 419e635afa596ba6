//! Run configuration for zfsback
//!
//! The configuration is a YAML file naming the datasets to back up and where
//! each one goes. It is parsed into typed structures and validated once at
//! load; the rest of the program trusts it.
//!
//! ```yaml
//! lock_file: /var/lock/zfsback.lock
//! log_file: /var/log/zfsback.log
//! retain_snaps: 5
//! datasets:
//!   - name: pool/data
//!     destinations:
//!       - dest: backuppool/data
//!         transport: local
//!       - dest: tank/data
//!         transport: ssh:backup@host.example:2222
//!         retain_snaps: 14
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{BackupError, BackupResult};
use crate::transport::Destination;
use crate::zfs::snapshot::{is_timestamp_name, DEFAULT_ANCHOR_NAME};

/// Lockfile path used when the config does not name one
pub const DEFAULT_LOCK_FILE: &str = "/var/lock/zfsback.lock";

/// One dataset to back up and its destinations
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetConfig {
    /// Source dataset path
    pub name: String,
    /// Where to replicate it, attempted in order
    pub destinations: Vec<Destination>,
}

/// The whole run configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Datasets to back up
    pub datasets: Vec<DatasetConfig>,

    /// Global retention count, overridable per destination; absent means
    /// retention pruning is off
    #[serde(default)]
    pub retain_snaps: Option<u32>,

    /// Lockfile path override
    #[serde(default)]
    pub lock_file: Option<PathBuf>,

    /// Log file; log output goes to stderr when absent
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Name of the incremental anchor snapshot (no `@`)
    #[serde(default = "default_incremental_name")]
    pub incremental_name: String,
}

fn default_incremental_name() -> String {
    DEFAULT_ANCHOR_NAME.to_string()
}

impl Config {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> BackupResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            BackupError::Config(format!(
                "failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: Config = serde_yaml::from_str(&contents).map_err(|e| {
            BackupError::Config(format!("invalid config file {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Build a one-dataset configuration from command-line arguments
    pub fn single_run(dataset: &str, dest: &str, transport: &str) -> BackupResult<Self> {
        let config = Config {
            datasets: vec![DatasetConfig {
                name: dataset.to_string(),
                destinations: vec![Destination {
                    dest: dest.to_string(),
                    transport: transport.parse()?,
                    retain_snaps: None,
                }],
            }],
            retain_snaps: None,
            lock_file: None,
            log_file: None,
            incremental_name: default_incremental_name(),
        };
        config.validate()?;
        Ok(config)
    }

    /// The effective lockfile path
    pub fn lock_file(&self) -> PathBuf {
        self.lock_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOCK_FILE))
    }

    fn validate(&self) -> BackupResult<()> {
        if self.datasets.is_empty() {
            return Err(BackupError::Config(
                "no datasets defined, or defined incorrectly".to_string(),
            ));
        }
        for dataset in &self.datasets {
            if dataset.name.trim().is_empty() {
                return Err(BackupError::Config(
                    "dataset with an empty name".to_string(),
                ));
            }
            if dataset.destinations.is_empty() {
                return Err(BackupError::Config(format!(
                    "no destinations defined for dataset {}",
                    dataset.name
                )));
            }
            for destination in &dataset.destinations {
                if destination.dest.trim().is_empty() {
                    return Err(BackupError::Config(format!(
                        "destination with an empty dest for dataset {}",
                        dataset.name
                    )));
                }
            }
        }
        if self.incremental_name.is_empty() || self.incremental_name.contains('@') {
            return Err(BackupError::Config(format!(
                "invalid incremental_name {:?}: must be a snapshot name without '@'",
                self.incremental_name
            )));
        }
        // An anchor that looks like a timestamp snapshot would trip the
        // straggler gate on every run.
        if is_timestamp_name(&self.incremental_name) {
            return Err(BackupError::Config(format!(
                "invalid incremental_name {:?}: collides with the timestamp naming convention",
                self.incremental_name
            )));
        }
        Ok(())
    }
}
