//! Backup orchestration
//!
//! - `runner`: the per-dataset backup cycle
//! - `prune`: destination retention pruning
//!
//! `run_all` is the top-level loop over a configuration: every dataset gets
//! its cycle, failures are counted and reported, and no failure stops the
//! remaining datasets from being attempted.

pub mod prune;
pub mod runner;

use tracing::{error, info};

use crate::config::Config;
use crate::error::BackupError;

pub use prune::RetentionPruner;
pub use runner::BackupRunner;

/// Outcome of a configured run across all datasets
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    /// Datasets attempted
    pub datasets: usize,
    /// Datasets that failed or were blocked
    pub failures: usize,
}

impl RunSummary {
    /// True when every dataset backed up cleanly
    pub fn all_succeeded(&self) -> bool {
        self.failures == 0
    }
}

/// Back up every configured dataset, continuing past per-dataset failures
pub fn run_all(config: &Config, runner: &BackupRunner) -> RunSummary {
    let mut failures = 0;
    for dataset in &config.datasets {
        match runner.backup_dataset(&dataset.name, &dataset.destinations) {
            Ok(()) => {
                info!("dataset backup of {} finished", dataset.name);
            }
            Err(BackupError::Stragglers(_)) => {
                // The gate already warned with reconciliation instructions.
                failures += 1;
            }
            Err(e) => {
                error!(
                    "dataset backup of {} FAILED! You'll want to see to that! ({})",
                    dataset.name, e
                );
                failures += 1;
            }
        }
    }
    RunSummary {
        datasets: config.datasets.len(),
        failures,
    }
}
