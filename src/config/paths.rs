//! Where `tts-sync` keeps its files.
//!
//! `settings.toml` lives in the platform config directory and
//! `progress.json` (the durable reading position) in the local data
//! directory, each under a `tts-sync` subdirectory.  When the platform
//! reports no such directory the working directory is used instead.

use std::path::{Path, PathBuf};

const APP_DIR: &str = "tts-sync";
const SETTINGS_FILE: &str = "settings.toml";
const PROGRESS_FILE: &str = "progress.json";

/// Resolved locations of the settings and progress files.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub settings_file: PathBuf,
    pub data_dir: PathBuf,
    pub progress_file: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        Self::rooted(
            &app_dir(dirs::config_dir()),
            &app_dir(dirs::data_local_dir()),
        )
    }

    /// Paths under explicit config and data directories.
    pub fn rooted(config_dir: &Path, data_dir: &Path) -> Self {
        Self {
            config_dir: config_dir.to_path_buf(),
            settings_file: config_dir.join(SETTINGS_FILE),
            data_dir: data_dir.to_path_buf(),
            progress_file: data_dir.join(PROGRESS_FILE),
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn app_dir(platform: Option<PathBuf>) -> PathBuf {
    platform.unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_sit_in_their_directories() {
        let paths = AppPaths::new();
        assert!(paths.config_dir.ends_with(APP_DIR));
        assert!(paths.data_dir.ends_with(APP_DIR));
        assert_eq!(paths.settings_file, paths.config_dir.join("settings.toml"));
        assert_eq!(paths.progress_file, paths.data_dir.join("progress.json"));
    }

    #[test]
    fn missing_platform_dir_falls_back_to_working_dir() {
        assert_eq!(app_dir(None), Path::new(".").join("tts-sync"));
    }
}
