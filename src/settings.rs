//! Per-user file locations: config file, log directory and export directory.

use std::path::PathBuf;

use anyhow::Result;
use directories::ProjectDirs;

/// Directory name used under the platform config/data roots.
const APP_DIR: &str = "pim-tui";

/// Config file name inside the user config directory.
const CONFIG_FILE: &str = "config.toml";

/// Log file name inside the log directory.
pub const LOG_FILE: &str = "pim-tui.log";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APP_DIR)
}

/// Path of the optional user config file, e.g. `~/.config/pim-tui/config.toml`.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
}

/// Get the path to the log directory.
pub fn log_directory() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_local_dir().join("logs"))
        .unwrap_or_else(|| std::env::temp_dir().join(APP_DIR))
}

/// Initialize the log directory.
pub fn init_log_directory() -> Result<PathBuf> {
    let log_dir = log_directory();
    if !log_dir.exists() {
        std::fs::create_dir_all(&log_dir)?;
    }
    Ok(log_dir)
}

/// Directory that activation history exports are written to.
pub fn export_directory() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join(APP_DIR))
}
