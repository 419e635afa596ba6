//! Snapshot lifecycle operations against the zfs tool
//!
//! All operations shell out to `zfs` with a bounded timeout and no internal
//! retries. Identifier arguments are validated before any process is spawned,
//! so a malformed value can never reach `zfs destroy` or `zfs rename`.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use chrono::Local;
use tracing::error;

use crate::error::{BackupError, BackupResult};
use crate::zfs::exec::{run_with_timeout, CommandOutput};
use crate::zfs::snapshot::{is_timestamp_name, timestamp_name, SnapshotId};

/// Timeout for snapshot create, rename and list operations
const ZFS_OP_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for snapshot destroy, the heaviest operation
const ZFS_DESTROY_TIMEOUT: Duration = Duration::from_secs(180);

/// Creates, lists, deletes and renames snapshots of a dataset
#[derive(Debug, Clone)]
pub struct SnapshotManager {
    /// Path to the zfs binary
    zfs_path: PathBuf,
}

impl Default for SnapshotManager {
    fn default() -> Self {
        Self {
            zfs_path: PathBuf::from("zfs"),
        }
    }
}

impl SnapshotManager {
    /// Create a manager that resolves `zfs` from PATH
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a manager with a specific path to the zfs binary
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            zfs_path: path.into(),
        }
    }

    /// The zfs binary this manager invokes
    pub fn zfs_path(&self) -> &PathBuf {
        &self.zfs_path
    }

    /// Create a snapshot of `dataset` with the given name
    pub fn create(&self, dataset: &str, name: &str) -> BackupResult<SnapshotId> {
        let id = SnapshotId::new(dataset, name)?;
        self.run_zfs(
            &["snapshot", id.as_str()],
            ZFS_OP_TIMEOUT,
            &format!("create snapshot {}", id),
        )?;
        Ok(id)
    }

    /// Create a snapshot named from the current time (`backup-YYYYMMDD-HHMMSS`)
    pub fn create_timestamped(&self, dataset: &str) -> BackupResult<SnapshotId> {
        let name = timestamp_name(Local::now());
        self.create(dataset, &name)
    }

    /// Destroy a snapshot
    ///
    /// Rejects anything that is not a `dataset@name` identifier before
    /// invoking the tool, so a plain dataset path can never be destroyed.
    pub fn delete(&self, snapshot: &str) -> BackupResult<()> {
        let id = SnapshotId::parse(snapshot)?;
        self.run_zfs(
            &["destroy", id.as_str()],
            ZFS_DESTROY_TIMEOUT,
            &format!("destroy snapshot {}", id),
        )?;
        Ok(())
    }

    /// Rename a snapshot to a new `dataset@name` identifier
    pub fn rename(&self, snapshot: &str, new_name: &str) -> BackupResult<()> {
        let from = SnapshotId::parse(snapshot)?;
        let to = SnapshotId::parse(new_name)?;
        self.run_zfs(
            &["rename", from.as_str(), to.as_str()],
            ZFS_OP_TIMEOUT,
            &format!("rename snapshot {} to {}", from, to),
        )?;
        Ok(())
    }

    /// List snapshot identifiers under a dataset, in the tool's native order
    pub fn list(&self, dataset: &str) -> BackupResult<Vec<String>> {
        let out = self.run_zfs(
            &["list", "-H", "-r", "-t", "snapshot", "-o", "name", dataset],
            ZFS_OP_TIMEOUT,
            &format!("list snapshots of {}", dataset),
        )?;
        Ok(out.stdout_lines())
    }

    /// Whether the dataset carries the incremental anchor snapshot
    ///
    /// Drives the full-vs-incremental mode decision: incremental iff the
    /// listing contains `dataset@anchor` exactly.
    pub fn has_anchor(&self, dataset: &str, anchor: &str) -> BackupResult<bool> {
        let wanted = format!("{}@{}", dataset, anchor);
        Ok(self.list(dataset)?.iter().any(|s| s == &wanted))
    }

    /// Whether the dataset has timestamp-named snapshots left by an
    /// interrupted run
    ///
    /// Conservative by design: an in-flight legitimate run is indistinguishable
    /// from an abandoned one, so any timestamp snapshot blocks the dataset.
    pub fn has_stragglers(&self, dataset: &str) -> BackupResult<bool> {
        Ok(self
            .list(dataset)?
            .iter()
            .any(|s| matches!(s.split_once('@'), Some((_, name)) if is_timestamp_name(name))))
    }

    fn run_zfs(
        &self,
        args: &[&str],
        timeout: Duration,
        what: &str,
    ) -> BackupResult<CommandOutput> {
        let mut cmd = Command::new(&self.zfs_path);
        cmd.args(args);
        match run_with_timeout(&mut cmd, timeout) {
            Ok(Some(out)) if out.success() => Ok(out),
            Ok(Some(out)) => {
                error!("unable to {}: {}", what, out.diagnostic());
                Err(BackupError::SnapshotOp(format!(
                    "{}: {}",
                    what,
                    out.diagnostic()
                )))
            }
            Ok(None) => {
                error!("unable to {}: timeout reached", what);
                Err(BackupError::SnapshotOp(format!(
                    "{}: timeout reached",
                    what
                )))
            }
            Err(e) => Err(BackupError::SnapshotOp(format!(
                "{}: failed to run {}: {}",
                what,
                self.zfs_path.display(),
                e
            ))),
        }
    }
}
