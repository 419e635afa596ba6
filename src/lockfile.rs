//! Single-instance run lock
//!
//! One zfsback process at a time: the lockfile is created with
//! create-exclusive semantics, so acquisition is atomic and a second instance
//! fails fast instead of racing the first one's snapshots.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{BackupError, BackupResult};

/// An acquired run lock; releasing removes the file
#[derive(Debug)]
pub struct Lockfile {
    path: PathBuf,
}

impl Lockfile {
    /// Atomically create the lockfile, failing if it already exists
    pub fn acquire(path: impl Into<PathBuf>) -> BackupResult<Self> {
        let path = path.into();
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => BackupError::Lock(format!(
                    "lock file {} already exists; is another instance running?",
                    path.display()
                )),
                _ => BackupError::Lock(format!(
                    "unable to create lock file {}: {}",
                    path.display(),
                    e
                )),
            })?;
        // Record the owner pid for an operator staring at a stale lock.
        let _ = writeln!(file, "{}", std::process::id());
        Ok(Self { path })
    }

    /// The path this lock holds
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the lockfile, reporting a failure to do so
    pub fn release(self) -> BackupResult<()> {
        let path = self.path.clone();
        // Drop must not remove it a second time.
        std::mem::forget(self);
        std::fs::remove_file(&path)
            .map_err(|e| BackupError::Lock(format!("unable to clean up lockfile: {}", e)))
    }
}

impl Drop for Lockfile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("unable to clean up lockfile {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_creates_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("run.lock");
        let lock = Lockfile::acquire(&path).unwrap();
        assert!(path.exists());
        lock.release().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_second_acquire_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("run.lock");
        let _lock = Lockfile::acquire(&path).unwrap();
        let err = Lockfile::acquire(&path).unwrap_err();
        assert!(matches!(err, BackupError::Lock(_)));
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_drop_releases() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("run.lock");
        {
            let _lock = Lockfile::acquire(&path).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_unwritable_location_is_lock_error() {
        let err = Lockfile::acquire("/nonexistent/dir/run.lock").unwrap_err();
        assert!(matches!(err, BackupError::Lock(_)));
    }
}
