//! Retention pruning of destination snapshots
//!
//! After a successful backup cycle the destination accumulates one timestamp
//! snapshot per run. Pruning keeps the most recent N (per-destination setting,
//! falling back to the global one) and deletes the rest, oldest first. The
//! timestamp naming convention makes this a string sort: lexicographic order
//! equals chronological order.
//!
//! Pruning is best-effort housekeeping. Failures are logged and counted but
//! never fail the run, and each destination is handled independently.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::transport::{zfs_command, Destination};
use crate::zfs::exec::run_with_timeout;
use crate::zfs::snapshot::is_timestamp_name;

/// Timeout for the destination listing query
const PRUNE_LIST_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for each snapshot destroy
const PRUNE_DESTROY_TIMEOUT: Duration = Duration::from_secs(180);

/// Deletes aged timestamp snapshots at backup destinations
#[derive(Debug, Clone)]
pub struct RetentionPruner {
    /// Path to the zfs binary
    zfs_path: PathBuf,
    /// Path to the ssh binary for remote destinations
    ssh_path: PathBuf,
}

impl Default for RetentionPruner {
    fn default() -> Self {
        Self {
            zfs_path: PathBuf::from("zfs"),
            ssh_path: PathBuf::from("ssh"),
        }
    }
}

impl RetentionPruner {
    /// Create a pruner that resolves `zfs` and `ssh` from PATH
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pruner with specific paths to the zfs and ssh binaries
    pub fn with_paths(zfs: impl Into<PathBuf>, ssh: impl Into<PathBuf>) -> Self {
        Self {
            zfs_path: zfs.into(),
            ssh_path: ssh.into(),
        }
    }

    /// Prune every destination, returning the number of failures encountered
    ///
    /// A destination with no effective retain count is skipped entirely; that
    /// is "retention not configured", not "retain zero".
    pub fn prune(&self, destinations: &[Destination], global_retain: Option<u32>) -> usize {
        let mut failures = 0;
        for destination in destinations {
            let Some(retain) = destination.retain_snaps.or(global_retain) else {
                debug!(
                    "no retention configured for {}, skipping prune",
                    destination.dest
                );
                continue;
            };
            failures += self.prune_destination(destination, retain as usize);
        }
        failures
    }

    fn prune_destination(&self, destination: &Destination, retain: usize) -> usize {
        let snapshots = match self.list_destination(destination) {
            Ok(s) => s,
            Err(diag) => {
                warn!(
                    "unable to list snapshots of {} via <{}> for pruning: {}",
                    destination.dest, destination.transport, diag
                );
                return 1;
            }
        };

        let prunable = select_prunable(&snapshots, &destination.dest, retain);
        if prunable.is_empty() {
            return 0;
        }

        let mut failures = 0;
        for snapshot in prunable {
            let mut cmd = zfs_command(
                &self.zfs_path,
                &self.ssh_path,
                &destination.transport,
                &["destroy", &snapshot],
            );
            match run_with_timeout(&mut cmd, PRUNE_DESTROY_TIMEOUT) {
                Ok(Some(out)) if out.success() => {
                    info!(
                        "pruned {} at <{}>",
                        snapshot, destination.transport
                    );
                }
                Ok(Some(out)) => {
                    warn!(
                        "unable to prune {} via <{}>: {}",
                        snapshot,
                        destination.transport,
                        out.diagnostic()
                    );
                    failures += 1;
                }
                Ok(None) => {
                    warn!(
                        "unable to prune {} via <{}>: timeout reached",
                        snapshot, destination.transport
                    );
                    failures += 1;
                }
                Err(e) => {
                    warn!(
                        "unable to prune {} via <{}>: {}",
                        snapshot, destination.transport, e
                    );
                    failures += 1;
                }
            }
        }
        failures
    }

    fn list_destination(&self, destination: &Destination) -> Result<Vec<String>, String> {
        let mut cmd = zfs_command(
            &self.zfs_path,
            &self.ssh_path,
            &destination.transport,
            &["list", "-H", "-r", "-t", "snapshot", "-o", "name", &destination.dest],
        );
        match run_with_timeout(&mut cmd, PRUNE_LIST_TIMEOUT) {
            Ok(Some(out)) if out.success() => Ok(out.stdout_lines()),
            Ok(Some(out)) => Err(out.diagnostic()),
            Ok(None) => Err("timeout reached".to_string()),
            Err(e) => Err(e.to_string()),
        }
    }
}

/// Timestamp snapshots of `dataset` beyond the retained count, oldest first
fn select_prunable(snapshots: &[String], dataset: &str, retain: usize) -> Vec<String> {
    let mut timestamped: Vec<String> = snapshots
        .iter()
        .filter(|s| {
            matches!(
                s.split_once('@'),
                Some((ds, name)) if ds == dataset && is_timestamp_name(name)
            )
        })
        .cloned()
        .collect();
    timestamped.sort();
    if timestamped.len() <= retain {
        return Vec::new();
    }
    let excess = timestamped.len() - retain;
    timestamped.truncate(excess);
    timestamped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snaps(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_select_prunable_deletes_oldest_beyond_retain() {
        let listing = snaps(&[
            "tank/data@backup-20240101-000000",
            "tank/data@backup-20240102-000000",
            "tank/data@backup-20240103-000000",
            "tank/data@backup-20240104-000000",
            "tank/data@backup-20240105-000000",
            "tank/data@backup-20240106-000000",
            "tank/data@backup-20240107-000000",
        ]);
        let prunable = select_prunable(&listing, "tank/data", 2);
        assert_eq!(
            prunable,
            snaps(&[
                "tank/data@backup-20240101-000000",
                "tank/data@backup-20240102-000000",
                "tank/data@backup-20240103-000000",
                "tank/data@backup-20240104-000000",
                "tank/data@backup-20240105-000000",
            ])
        );
    }

    #[test]
    fn test_select_prunable_under_retain_deletes_nothing() {
        let listing = snaps(&[
            "tank/data@backup-20240101-000000",
            "tank/data@backup-20240102-000000",
        ]);
        assert!(select_prunable(&listing, "tank/data", 2).is_empty());
        assert!(select_prunable(&listing, "tank/data", 5).is_empty());
    }

    #[test]
    fn test_select_prunable_ignores_anchor_and_foreign_names() {
        let listing = snaps(&[
            "tank/data@backup-last",
            "tank/data@manual-snap",
            "tank/data@backup-20240101-000000",
            "tank/other@backup-20230101-000000",
        ]);
        assert!(select_prunable(&listing, "tank/data", 1).is_empty());
    }

    #[test]
    fn test_select_prunable_unsorted_input() {
        let listing = snaps(&[
            "tank/data@backup-20240103-000000",
            "tank/data@backup-20240101-000000",
            "tank/data@backup-20240102-000000",
        ]);
        assert_eq!(
            select_prunable(&listing, "tank/data", 1),
            snaps(&[
                "tank/data@backup-20240101-000000",
                "tank/data@backup-20240102-000000",
            ])
        );
    }

    #[cfg(unix)]
    mod with_fakes {
        use super::*;
        use crate::testutil::{install_fake_ssh, install_fake_zfs, read_state, write_state};
        use crate::transport::Destination;
        use tempfile::TempDir;

        fn pruner() -> (RetentionPruner, std::path::PathBuf, TempDir) {
            let temp = TempDir::new().unwrap();
            let (zfs, state) = install_fake_zfs(temp.path());
            let ssh = install_fake_ssh(temp.path(), &state);
            (RetentionPruner::with_paths(zfs, ssh), state, temp)
        }

        #[test]
        fn test_prune_local_destination() {
            let (pruner, state, _temp) = pruner();
            write_state(
                &state,
                &[
                    "tank/data@backup-last",
                    "tank/data@backup-20240101-000000",
                    "tank/data@backup-20240102-000000",
                    "tank/data@backup-20240103-000000",
                ],
            );
            let failures = pruner.prune(&[Destination::local("tank/data")], Some(2));
            assert_eq!(failures, 0);
            assert_eq!(
                read_state(&state),
                vec![
                    "tank/data@backup-last",
                    "tank/data@backup-20240102-000000",
                    "tank/data@backup-20240103-000000",
                ]
            );
        }

        #[test]
        fn test_prune_respects_per_destination_override() {
            let (pruner, state, _temp) = pruner();
            write_state(
                &state,
                &[
                    "tank/data@backup-20240101-000000",
                    "tank/data@backup-20240102-000000",
                    "tank/data@backup-20240103-000000",
                ],
            );
            let mut destination = Destination::local("tank/data");
            destination.retain_snaps = Some(3);
            // Override keeps all three even though the global says one.
            let failures = pruner.prune(&[destination], Some(1));
            assert_eq!(failures, 0);
            assert_eq!(read_state(&state).len(), 3);
        }

        #[test]
        fn test_prune_skips_unconfigured_destination() {
            let (pruner, state, _temp) = pruner();
            write_state(
                &state,
                &[
                    "tank/data@backup-20240101-000000",
                    "tank/data@backup-20240102-000000",
                ],
            );
            let failures = pruner.prune(&[Destination::local("tank/data")], None);
            assert_eq!(failures, 0);
            assert_eq!(read_state(&state).len(), 2);
        }

        #[test]
        fn test_prune_over_ssh() {
            let (pruner, state, _temp) = pruner();
            write_state(
                &state,
                &[
                    "tank/data@backup-20240101-000000",
                    "tank/data@backup-20240102-000000",
                ],
            );
            let destination = Destination {
                dest: "tank/data".into(),
                transport: "ssh:backup@host.example".parse().unwrap(),
                retain_snaps: None,
            };
            let failures = pruner.prune(&[destination], Some(1));
            assert_eq!(failures, 0);
            assert_eq!(read_state(&state), vec!["tank/data@backup-20240102-000000"]);
        }

        #[test]
        fn test_listing_failure_counts_and_leaves_state() {
            let temp = TempDir::new().unwrap();
            let (_, state) = install_fake_zfs(temp.path());
            let ssh = install_fake_ssh(temp.path(), &state);
            write_state(&state, &["tank/data@backup-20240101-000000"]);
            let pruner = RetentionPruner::with_paths("/bin/false", ssh);
            let failures = pruner.prune(&[Destination::local("tank/data")], Some(0));
            assert_eq!(failures, 1);
            assert_eq!(read_state(&state).len(), 1);
        }
    }
}
