//! zfsback - automated ZFS snapshot backup and replication
//!
//! zfsback snapshots a dataset, streams the snapshot to one or more
//! destinations (on this host or over ssh), verifies each copy arrived, and
//! then advances a persistent "last backup" anchor snapshot so the next run
//! can send just the delta. Destinations are pruned to a configurable number
//! of retained snapshots after each successful cycle.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: YAML configuration loading and validation
//! - `error`: Custom error types
//! - `zfs`: Snapshot identifiers and lifecycle operations via the zfs tool
//! - `transport`: Local-pipe and ssh stream transfer, plus verification
//! - `backup`: The per-dataset backup cycle and retention pruning
//! - `lockfile`: Single-instance run lock
//!
//! # Example
//!
//! ```rust,ignore
//! use zfsback::backup::{run_all, BackupRunner};
//! use zfsback::config::Config;
//!
//! let config = Config::load(Path::new("/etc/zfsback.yml"))?;
//! let runner = BackupRunner::new(&config.incremental_name, config.retain_snaps);
//! let summary = run_all(&config, &runner);
//! ```

pub mod backup;
pub mod config;
pub mod error;
pub mod lockfile;
pub mod transport;
pub mod zfs;

#[cfg(all(test, unix))]
pub(crate) mod testutil;

pub use error::{BackupError, BackupResult};
