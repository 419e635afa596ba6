//! Snapshot management via the external zfs tool
//!
//! - `snapshot`: identifier type and naming conventions
//! - `exec`: bounded tool invocation with captured output
//! - `manager`: create/list/delete/rename operations and the straggler and
//!   anchor checks built on top of listing

pub mod exec;
pub mod manager;
pub mod snapshot;

pub use manager::SnapshotManager;
pub use snapshot::SnapshotId;
