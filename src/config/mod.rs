//! Configuration Management Module
//!
//! Persisted core settings: flow-control sizes, sub-channel readiness
//! policy, SSH defaults.

pub mod storage;
pub mod types;

pub use storage::{config_dir, config_file, download_dir, ConfigStorage, StorageError, CONFIG_ENV};
pub use types::{
    CoreConfig, FlowSettings, ReadinessSettings, SshSettings, CONFIG_VERSION,
};
