//! Configuration loading and validation

pub mod settings;

pub use settings::{Config, DatasetConfig, DEFAULT_LOCK_FILE};
