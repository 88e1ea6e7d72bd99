//! Configuration module for the read-aloud sync core.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for each component,
//! `AppPaths` for cross-platform config/data directories, and TOML
//! persistence via `AppConfig::load` / `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AppConfig, AutoStopConfig, AutoStopMode, QueueConfig, StorageConfig, TimingConfig,
};
