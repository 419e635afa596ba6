//! Post-transfer verification of snapshot presence
//!
//! After a transfer, the destination's listing is queried for the exact
//! snapshot name over the same transport the transfer used. "Not there" is an
//! answer (false); "could not determine" is an error, never silently mapped
//! to false.

use std::path::PathBuf;
use std::time::Duration;

use tracing::error;

use crate::error::{BackupError, BackupResult};
use crate::transport::{zfs_command, Transport};
use crate::zfs::exec::run_with_timeout;
use crate::zfs::snapshot::SnapshotId;

/// Timeout for a verification listing query
const VERIFY_TIMEOUT: Duration = Duration::from_secs(60);

/// Confirms that an expected snapshot is present at a destination
#[derive(Debug, Clone)]
pub struct VerificationProbe {
    /// Path to the zfs binary
    zfs_path: PathBuf,
    /// Path to the ssh binary for remote queries
    ssh_path: PathBuf,
}

impl Default for VerificationProbe {
    fn default() -> Self {
        Self {
            zfs_path: PathBuf::from("zfs"),
            ssh_path: PathBuf::from("ssh"),
        }
    }
}

impl VerificationProbe {
    /// Create a probe that resolves `zfs` and `ssh` from PATH
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a probe with specific paths to the zfs and ssh binaries
    pub fn with_paths(zfs: impl Into<PathBuf>, ssh: impl Into<PathBuf>) -> Self {
        Self {
            zfs_path: zfs.into(),
            ssh_path: ssh.into(),
        }
    }

    /// Whether `destination@name` exists, queried over the transport
    ///
    /// Returns `Ok(false)` only when the listing positively reports the
    /// snapshot as absent. A timeout, spawn failure or unexplained non-zero
    /// exit is a verification error.
    pub fn exists(
        &self,
        destination: &str,
        name: &str,
        transport: &Transport,
    ) -> BackupResult<bool> {
        let id = SnapshotId::new(destination, name)?;
        let mut cmd = zfs_command(
            &self.zfs_path,
            &self.ssh_path,
            transport,
            &["list", "-H", "-t", "snapshot", "-o", "name", id.as_str()],
        );
        match run_with_timeout(&mut cmd, VERIFY_TIMEOUT) {
            Ok(Some(out)) if out.success() => {
                Ok(out.stdout_lines().iter().any(|l| l == id.as_str()))
            }
            Ok(Some(out)) if is_not_found(&out.diagnostic()) => Ok(false),
            Ok(Some(out)) => {
                error!(
                    "unable to verify {} exists via <{}>: {}",
                    id,
                    transport,
                    out.diagnostic()
                );
                Err(BackupError::Verification(format!(
                    "listing of {} via <{}> failed: {}",
                    id,
                    transport,
                    out.diagnostic()
                )))
            }
            Ok(None) => Err(BackupError::Verification(format!(
                "listing of {} via <{}> timed out",
                id, transport
            ))),
            Err(e) => Err(BackupError::Verification(format!(
                "failed to run listing of {} via <{}>: {}",
                id, transport, e
            ))),
        }
    }
}

/// Does this diagnostic positively say the snapshot is absent?
fn is_not_found(msg: &str) -> bool {
    let m = msg.to_ascii_lowercase();
    m.contains("does not exist") || m.contains("no such") || m.contains("not found")
}
