//! Producer/consumer snapshot stream transfer
//!
//! A transfer connects `zfs send` to `zfs recv` with an OS pipe. Locally both
//! processes run on this host; remotely the receive command runs on the
//! destination through ssh, with the producer's output piped into the ssh
//! session's stdin. The two endpoints are the only real concurrency in the
//! program and both must be awaited: either side exiting non-zero fails the
//! transfer, and any error while waiting kills both before propagating.
//!
//! Transfers have no deadline. A multi-terabyte full send legitimately runs
//! for hours; stuck transfers are an operator concern, not a timeout.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::{error, info};

use crate::error::{BackupError, BackupResult};
use crate::transport::Transport;
use crate::zfs::exec::{join_reader, kill_and_reap, spawn_reader};
use crate::zfs::snapshot::SnapshotId;

/// Moves a snapshot stream from a source dataset to a destination
#[derive(Debug, Clone)]
pub struct TransportPipe {
    /// Path to the zfs binary (producer, and consumer when local)
    zfs_path: PathBuf,
    /// Path to the ssh binary (consumer side of a remote transfer)
    ssh_path: PathBuf,
}

impl Default for TransportPipe {
    fn default() -> Self {
        Self {
            zfs_path: PathBuf::from("zfs"),
            ssh_path: PathBuf::from("ssh"),
        }
    }
}

impl TransportPipe {
    /// Create a pipe that resolves `zfs` and `ssh` from PATH
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pipe with specific paths to the zfs and ssh binaries
    pub fn with_paths(zfs: impl Into<PathBuf>, ssh: impl Into<PathBuf>) -> Self {
        Self {
            zfs_path: zfs.into(),
            ssh_path: ssh.into(),
        }
    }

    /// Send `snapshot` into the destination dataset over the given transport
    ///
    /// With `incremental_source` the stream carries only the delta between the
    /// source snapshot and `snapshot`; without it the full dataset state is
    /// sent. The receive side always force-rolls the destination (`recv -F`).
    pub fn send(
        &self,
        snapshot: &str,
        destination: &str,
        transport: &Transport,
        incremental_source: Option<&str>,
    ) -> BackupResult<()> {
        let snap = SnapshotId::parse(snapshot)?;
        let inc = incremental_source.map(SnapshotId::parse).transpose()?;

        let mut producer = self
            .send_command(&snap, inc.as_ref())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                BackupError::Transfer(format!(
                    "failed to start send of {}: {}",
                    snap, e
                ))
            })?;

        let stream = match producer.stdout.take() {
            Some(s) => s,
            None => {
                kill_and_reap(&mut producer);
                return Err(BackupError::Transfer(format!(
                    "send of {} produced no output stream",
                    snap
                )));
            }
        };

        let mut consumer = match self
            .receive_command(destination, transport)
            .stdin(Stdio::from(stream))
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(c) => c,
            Err(e) => {
                kill_and_reap(&mut producer);
                return Err(BackupError::Transfer(format!(
                    "failed to start receive into {}: {}",
                    destination, e
                )));
            }
        };

        // Drain stderr of both endpoints concurrently; a diagnostic burst must
        // not be able to stall either process on a full pipe.
        let producer_stderr = spawn_reader(producer.stderr.take());
        let consumer_stderr = spawn_reader(consumer.stderr.take());

        // The consumer exits once the stream ends; wait for it first, then the
        // producer. Errors while waiting terminate both endpoints.
        let recv_status = match consumer.wait() {
            Ok(s) => s,
            Err(e) => {
                kill_and_reap(&mut producer);
                kill_and_reap(&mut consumer);
                error!("error while waiting on receive side: {}", e);
                return Err(BackupError::Transfer(format!(
                    "error while waiting on receive into {}: {}",
                    destination, e
                )));
            }
        };
        let send_status = match producer.wait() {
            Ok(s) => s,
            Err(e) => {
                kill_and_reap(&mut producer);
                error!("error while waiting on send side: {}", e);
                return Err(BackupError::Transfer(format!(
                    "error while waiting on send of {}: {}",
                    snap, e
                )));
            }
        };

        let send_diag = join_reader(producer_stderr);
        let recv_diag = join_reader(consumer_stderr);

        if !send_status.success() || !recv_status.success() {
            error!("send of {} to {} failed", snap, destination);
            if !send_diag.trim().is_empty() {
                error!("zfs send stderr: {}", send_diag.trim());
            }
            if !recv_diag.trim().is_empty() {
                error!("recv stderr: {}", recv_diag.trim());
            }
            let diag = if !send_status.success() {
                send_diag.trim().to_string()
            } else {
                recv_diag.trim().to_string()
            };
            return Err(BackupError::Transfer(format!(
                "send of {} to {} failed: {}",
                snap,
                destination,
                if diag.is_empty() { "no diagnostic output".to_string() } else { diag }
            )));
        }

        info!(
            "finished send of {} via <{}> to {}",
            snap, transport, destination
        );
        Ok(())
    }

    fn send_command(&self, snapshot: &SnapshotId, inc: Option<&SnapshotId>) -> Command {
        let mut cmd = Command::new(&self.zfs_path);
        cmd.arg("send").arg("-ec");
        if let Some(source) = inc {
            cmd.arg("-i").arg(source.as_str());
        }
        cmd.arg(snapshot.as_str());
        cmd
    }

    fn receive_command(&self, destination: &str, transport: &Transport) -> Command {
        crate::transport::zfs_command(
            &self.zfs_path,
            &self.ssh_path,
            transport,
            &["recv", "-F", destination],
        )
    }
}
