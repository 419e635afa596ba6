//! Custom error types for zfsback
//!
//! This module defines the error hierarchy for the application using thiserror
//! for ergonomic error definitions.

use thiserror::Error;

/// The main error type for zfsback operations
#[derive(Error, Debug)]
pub enum BackupError {
    /// Malformed snapshot identifier, rejected before reaching any external process
    #[error("Validation error: {0}")]
    Validation(String),

    /// Snapshot create/delete/rename/list failure or timeout
    #[error("Snapshot operation failed: {0}")]
    SnapshotOp(String),

    /// Producer or consumer failure during a send/receive transfer
    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// Listing failure or timeout while checking a snapshot's presence
    #[error("Verification failed: {0}")]
    Verification(String),

    /// Timestamp snapshots left by an interrupted run block the dataset
    #[error("Dataset blocked by straggler snapshots: {0}")]
    Stragglers(String),

    /// A backup cycle failed for at least one destination
    #[error("Backup run failed: {0}")]
    Run(String),

    /// Cannot acquire or release the run lock
    #[error("Lock error: {0}")]
    Lock(String),

    /// Invalid configuration, surfaced before any run starts
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),
}

impl BackupError {
    /// Create a validation error for a value that is not a `dataset@name` identifier
    pub fn not_a_snapshot(value: impl Into<String>) -> Self {
        Self::Validation(format!(
            "expected a snapshot identifier of the form dataset@name, got: {}",
            value.into()
        ))
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this is a transfer error
    pub fn is_transfer(&self) -> bool {
        matches!(self, Self::Transfer(_))
    }
}

// Implement From traits for common error types

impl From<std::io::Error> for BackupError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_yaml::Error> for BackupError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type alias for zfsback operations
pub type BackupResult<T> = Result<T, BackupError>;
