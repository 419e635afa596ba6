//! The backup cycle state machine
//!
//! One cycle per dataset: gate on stragglers, snapshot, decide
//! full-vs-incremental, transfer to every destination in turn, verify every
//! destination, then commit (advance the anchor) or roll back (delete the new
//! snapshot). The anchor only advances when every destination verified, so a
//! partial failure cannot corrupt the incremental chain: at worst the prior
//! chain stays current and the cycle is retried wholesale.

use tracing::{error, info, warn};

use crate::backup::prune::RetentionPruner;
use crate::error::{BackupError, BackupResult};
use crate::transport::{Destination, TransportPipe, VerificationProbe};
use crate::zfs::snapshot::SnapshotId;
use crate::zfs::SnapshotManager;

/// Drives one backup cycle per dataset across its destinations
#[derive(Debug, Clone)]
pub struct BackupRunner {
    snapshots: SnapshotManager,
    pipe: TransportPipe,
    probe: VerificationProbe,
    pruner: RetentionPruner,
    /// Name of the incremental anchor snapshot (no `@`)
    anchor: String,
    /// Global retention count, overridable per destination
    global_retain: Option<u32>,
}

impl BackupRunner {
    /// Create a runner that resolves `zfs` and `ssh` from PATH
    pub fn new(anchor: impl Into<String>, global_retain: Option<u32>) -> Self {
        Self {
            snapshots: SnapshotManager::new(),
            pipe: TransportPipe::new(),
            probe: VerificationProbe::new(),
            pruner: RetentionPruner::new(),
            anchor: anchor.into(),
            global_retain,
        }
    }

    /// Create a runner with specific paths to the zfs and ssh binaries
    pub fn with_tools(
        zfs: impl Into<std::path::PathBuf>,
        ssh: impl Into<std::path::PathBuf>,
        anchor: impl Into<String>,
        global_retain: Option<u32>,
    ) -> Self {
        let zfs = zfs.into();
        let ssh = ssh.into();
        Self {
            snapshots: SnapshotManager::with_path(&zfs),
            pipe: TransportPipe::with_paths(&zfs, &ssh),
            probe: VerificationProbe::with_paths(&zfs, &ssh),
            pruner: RetentionPruner::with_paths(&zfs, &ssh),
            anchor: anchor.into(),
            global_retain,
        }
    }

    /// Back up one dataset to all of its destinations
    ///
    /// The anchor advances only if every destination verified; otherwise the
    /// new snapshot is deleted and the prior chain is left untouched. On
    /// success, destination retention is pruned best-effort.
    pub fn backup_dataset(
        &self,
        dataset: &str,
        destinations: &[Destination],
    ) -> BackupResult<()> {
        // Gate: timestamp snapshots mean a prior run never finished. Blocking
        // here is deliberate; guessing whether the leftovers are safe to reuse
        // or delete is an operator decision.
        if self.snapshots.has_stragglers(dataset)? {
            warn!(
                "dataset {} has left over temporary snapshots. IT WAS NOT BACKED UP! \
                 Make sure everything is consistent, then remove the left over \
                 backup-YYYYMMDD-HHMMSS snapshots.",
                dataset
            );
            return Err(BackupError::Stragglers(dataset.to_string()));
        }

        let new_snap = self.snapshots.create_timestamped(dataset)?;
        let anchor = SnapshotId::new(dataset, &self.anchor)?;
        let incremental = self.snapshots.has_anchor(dataset, &self.anchor)?;

        let mut failed = vec![false; destinations.len()];

        // Transfer to each destination in turn. A failure is recorded and the
        // remaining destinations still get their stream.
        for (i, destination) in destinations.iter().enumerate() {
            let source = incremental.then(|| anchor.as_str());
            match self
                .pipe
                .send(new_snap.as_str(), &destination.dest, &destination.transport, source)
            {
                Ok(()) => {
                    info!(
                        "{} send of {} to {} via <{}> finished",
                        if incremental { "incremental" } else { "full" },
                        new_snap,
                        destination.dest,
                        destination.transport
                    );
                }
                Err(e) => {
                    error!(
                        "send of {} to {} via <{}> failed: {}",
                        new_snap, destination.dest, destination.transport, e
                    );
                    failed[i] = true;
                }
            }
        }

        // Verify every destination, even ones whose transfer already failed;
        // the listing is the ground truth the commit decision rests on.
        for (i, destination) in destinations.iter().enumerate() {
            match self
                .probe
                .exists(&destination.dest, new_snap.name(), &destination.transport)
            {
                Ok(true) => {
                    info!(
                        "verification of {}@{} via <{}> finished",
                        destination.dest,
                        new_snap.name(),
                        destination.transport
                    );
                }
                Ok(false) => {
                    error!(
                        "verification of {}@{} via <{}> FAILED!",
                        destination.dest,
                        new_snap.name(),
                        destination.transport
                    );
                    failed[i] = true;
                }
                Err(e) => {
                    error!(
                        "unable to verify {}@{} via <{}>: {}",
                        destination.dest,
                        new_snap.name(),
                        destination.transport,
                        e
                    );
                    failed[i] = true;
                }
            }
        }

        let failures = failed.iter().filter(|f| **f).count();
        if failures > 0 {
            self.rollback(&new_snap);
            return Err(BackupError::Run(format!(
                "backup of {} failed for {} of {} destination(s)",
                dataset,
                failures,
                destinations.len()
            )));
        }

        self.commit(&new_snap, &anchor, incremental)?;

        // Post-success housekeeping; failures are logged inside and never
        // affect the run result.
        let prune_failures = self.pruner.prune(destinations, self.global_retain);
        if prune_failures > 0 {
            warn!(
                "{} pruning failure(s) for destinations of {}",
                prune_failures, dataset
            );
        }
        Ok(())
    }

    /// Advance the anchor: delete the old one (if any), rename the new
    /// snapshot into its place
    fn commit(
        &self,
        new_snap: &SnapshotId,
        anchor: &SnapshotId,
        had_anchor: bool,
    ) -> BackupResult<()> {
        if had_anchor {
            if let Err(e) = self.snapshots.delete(anchor.as_str()) {
                error!(
                    "UNABLE TO DELETE {}. You need to delete it and then rename {} to {} \
                     manually! ({})",
                    anchor, new_snap, anchor, e
                );
                return Err(e);
            }
            info!("deleted old anchor snapshot {}", anchor);
        }
        if let Err(e) = self.snapshots.rename(new_snap.as_str(), anchor.as_str()) {
            // The worst spot to fail: the old anchor is gone and the new
            // snapshot still has its timestamp name. Only an operator can
            // reconcile this; retrying blindly could ruin the chain.
            error!(
                "UNABLE TO RENAME {} TO {}. YOU NEED TO DO THIS MANUALLY!",
                new_snap, anchor
            );
            return Err(e);
        }
        info!("rename of {} to {} finished", new_snap, anchor);
        Ok(())
    }

    /// Delete the new source snapshot after a failed cycle, best-effort
    fn rollback(&self, new_snap: &SnapshotId) {
        if let Err(e) = self.snapshots.delete(new_snap.as_str()) {
            error!(
                "unable to clean up snapshot {} after failed backup: {}",
                new_snap, e
            );
        }
    }
}
