use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::Context;
use clap::Parser;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use zfsback::backup::{run_all, BackupRunner};
use zfsback::config::Config;
use zfsback::error::BackupError;
use zfsback::lockfile::Lockfile;

#[derive(Parser)]
#[command(
    name = "zfsback",
    version,
    about = "Automatically create and send snapshots of zfs datasets",
    long_about = "zfsback snapshots datasets and replicates them to local or \
                  remote destinations, keeping an incremental chain anchored \
                  by a last-backup snapshot and pruning old snapshots at the \
                  destinations."
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "ZFSBACK_CONFIG")]
    config: Option<PathBuf>,

    /// Name of a single dataset to replicate (instead of a config run)
    dataset: Option<String>,

    /// Where to send the dataset
    destination: Option<String>,

    /// How to send it: 'local' or 'ssh:user@host[:port]'
    #[arg(default_value = "local")]
    transport: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Nothing processed yet; any failure from here to the lock is exit 2 so
    // schedulers can tell "never started" from "a backup failed".
    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Exiting: {}", e);
            return ExitCode::from(2);
        }
    };

    if let Err(e) = init_logging(config.log_file.as_deref()) {
        eprintln!("Exiting: {:#}", e);
        return ExitCode::from(2);
    }

    let lock = match Lockfile::acquire(config.lock_file()) {
        Ok(lock) => lock,
        Err(e) => {
            error!("Exiting: cannot get a lockfile: {}", e);
            return ExitCode::from(2);
        }
    };

    let runner = BackupRunner::new(&config.incremental_name, config.retain_snaps);
    let summary = run_all(&config, &runner);

    if let Err(e) = lock.release() {
        warn!("{}", e);
    }

    if summary.all_succeeded() {
        ExitCode::SUCCESS
    } else {
        error!(
            "{} of {} dataset backup(s) failed",
            summary.failures, summary.datasets
        );
        ExitCode::from(1)
    }
}

/// Turn the command line into a run configuration
///
/// A dataset/destination pair selects a single-run; otherwise a config file
/// is required, as in the original two invocation modes.
fn resolve_config(cli: &Cli) -> Result<Config, BackupError> {
    match (&cli.config, &cli.dataset, &cli.destination) {
        (_, Some(dataset), Some(destination)) => {
            Config::single_run(dataset, destination, &cli.transport)
        }
        (_, Some(_), None) | (_, None, Some(_)) => Err(BackupError::Config(
            "please provide both a dataset and a destination".to_string(),
        )),
        (Some(path), None, None) => Config::load(path),
        (None, None, None) => Err(BackupError::Config(
            "config file required if no other arguments given".to_string(),
        )),
    }
}

/// Route leveled logging to the configured file, or stderr
fn init_logging(log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("unable to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}
