//! Snapshot identifiers and naming conventions
//!
//! A snapshot is identified canonically as `dataset@name`. Two naming
//! conventions matter to the backup cycle: the timestamp convention
//! (`backup-YYYYMMDD-HHMMSS`, lexicographically sortable so string order
//! equals chronological order) and the incremental anchor (a fixed name,
//! `backup-last` by default, marking the last verified backup).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local};

use crate::error::{BackupError, BackupResult};

/// Prefix shared by timestamp snapshots and the default anchor name
pub const TIMESTAMP_PREFIX: &str = "backup-";

/// Default name of the incremental anchor snapshot
pub const DEFAULT_ANCHOR_NAME: &str = "backup-last";

/// A validated `dataset@name` snapshot identifier
///
/// Construction guarantees exactly one `@` with non-empty dataset and name
/// halves, so privileged operations (destroy, rename, send) can trust the
/// identifier they are handed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotId(String);

impl SnapshotId {
    /// Build an identifier from a dataset path and a snapshot name
    pub fn new(dataset: &str, name: &str) -> BackupResult<Self> {
        if dataset.is_empty() || dataset.contains('@') {
            return Err(BackupError::Validation(format!(
                "invalid dataset in snapshot identifier: {:?}",
                dataset
            )));
        }
        if name.is_empty() || name.contains('@') {
            return Err(BackupError::Validation(format!(
                "invalid snapshot name: {:?}",
                name
            )));
        }
        Ok(Self(format!("{}@{}", dataset, name)))
    }

    /// Parse a `dataset@name` string, rejecting anything else
    pub fn parse(s: &str) -> BackupResult<Self> {
        let (dataset, name) = s.split_once('@').ok_or_else(|| BackupError::not_a_snapshot(s))?;
        Self::new(dataset, name)
    }

    /// The dataset half of the identifier
    pub fn dataset(&self) -> &str {
        self.0.split_once('@').map(|(d, _)| d).unwrap_or(&self.0)
    }

    /// The name half of the identifier (after the `@`)
    pub fn name(&self) -> &str {
        self.0.split_once('@').map(|(_, n)| n).unwrap_or("")
    }

    /// The full `dataset@name` form as passed to the zfs tool
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the name half follows the timestamp convention
    pub fn is_timestamped(&self) -> bool {
        is_timestamp_name(self.name())
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SnapshotId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for SnapshotId {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Generate a timestamp snapshot name from the given instant
///
/// Second granularity; two snapshots created within the same second collide,
/// which the create operation will report as a tool error.
pub fn timestamp_name(now: DateTime<Local>) -> String {
    format!("{}{}", TIMESTAMP_PREFIX, now.format("%Y%m%d-%H%M%S"))
}

/// Check whether a snapshot name matches `backup-YYYYMMDD-HHMMSS`
pub fn is_timestamp_name(name: &str) -> bool {
    let Some(rest) = name.strip_prefix(TIMESTAMP_PREFIX) else {
        return false;
    };
    // Expected shape: 8 digits, '-', 6 digits
    let Some((date, time)) = rest.split_once('-') else {
        return false;
    };
    date.len() == 8
        && time.len() == 6
        && date.chars().all(|c| c.is_ascii_digit())
        && time.chars().all(|c| c.is_ascii_digit())
}
