//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and handed to each
//! component by value.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// QueueConfig
// ---------------------------------------------------------------------------

/// Engine queue refill tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Paragraphs sent per refill (15 – 25 works well on most engines).
    pub batch_size: usize,
    /// Refill once the engine's own queue holds this many utterances or fewer.
    pub low_watermark: usize,
    /// Append attempts per refill before falling back / deferring.
    pub max_append_attempts: u32,
    /// Linear backoff step between append attempts: `step * attempt`.
    pub backoff_step_ms: u64,
    /// Deferred refill cycles in a row before the user is told playback may
    /// stop.
    pub stall_notice_after: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: 25,
            low_watermark: 5,
            max_append_attempts: 3,
            backoff_step_ms: 150,
            stall_notice_after: 3,
        }
    }
}

impl QueueConfig {
    /// Delay before append attempt `attempt` (1-based) is retried.
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_step_ms * u64::from(attempt))
    }
}

// ---------------------------------------------------------------------------
// TimingConfig
// ---------------------------------------------------------------------------

/// Grace and settle windows around wake / chapter transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Window after a transition during which document-view reports are
    /// treated with suspicion.
    pub grace_ms: u64,
    /// Delay between screen-on and resuming playback, giving the document
    /// view time to settle its scroll position.
    pub wake_settle_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            grace_ms: 1000,
            wake_settle_ms: 300,
        }
    }
}

impl TimingConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    pub fn wake_settle(&self) -> Duration {
        Duration::from_millis(self.wake_settle_ms)
    }
}

// ---------------------------------------------------------------------------
// AutoStopConfig
// ---------------------------------------------------------------------------

/// What the auto-stop `amount` counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoStopMode {
    #[default]
    Off,
    Minutes,
    Paragraphs,
    Chapters,
}

/// Sleep-timer style automatic stop.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoStopConfig {
    pub mode: AutoStopMode,
    /// Minutes, paragraphs or chapters depending on `mode`.  `0` disables.
    pub amount: u32,
}

// ---------------------------------------------------------------------------
// StorageConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Durable progress file.  `None` means `<data dir>/progress.json`.
    pub progress_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use tts_sync::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub queue: QueueConfig,
    pub timing: TimingConfig,
    pub auto_stop: AutoStopConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// so callers never need to special-case a missing file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Resolved durable progress file.
    pub fn progress_file(&self) -> PathBuf {
        self.storage
            .progress_file
            .clone()
            .unwrap_or_else(|| AppPaths::new().progress_file)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = AppConfig::default();
        original.save_to(&path).expect("save");

        let loaded = AppConfig::load_from(&path).expect("load");
        assert_eq!(original, loaded);
    }

    /// `load_from` on a non-existent path must return `Default` without error.
    #[test]
    fn missing_file_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nope.toml");

        let config = AppConfig::load_from(&path).expect("load");
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.queue.batch_size, 25);
        assert_eq!(cfg.queue.low_watermark, 5);
        assert_eq!(cfg.queue.max_append_attempts, 3);
        assert_eq!(cfg.queue.backoff(2), Duration::from_millis(300));
        assert_eq!(cfg.timing.grace(), Duration::from_millis(1000));
        assert_eq!(cfg.auto_stop.mode, AutoStopMode::Off);
        assert!(cfg.storage.progress_file.is_none());
    }

    /// A partial file only overrides what it names.
    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("partial.toml");
        std::fs::write(
            &path,
            "[queue]\nbatch_size = 15\n\n[auto_stop]\nmode = \"paragraphs\"\namount = 40\n",
        )
        .expect("write");

        let cfg = AppConfig::load_from(&path).expect("load");
        assert_eq!(cfg.queue.batch_size, 15);
        assert_eq!(cfg.queue.low_watermark, 5);
        assert_eq!(cfg.auto_stop.mode, AutoStopMode::Paragraphs);
        assert_eq!(cfg.auto_stop.amount, 40);
        assert_eq!(cfg.timing, TimingConfig::default());
    }

    #[test]
    fn explicit_progress_file_wins() {
        let mut cfg = AppConfig::default();
        cfg.storage.progress_file = Some(PathBuf::from("/tmp/progress.json"));
        assert_eq!(cfg.progress_file(), PathBuf::from("/tmp/progress.json"));
    }
}
