//! Well-known filesystem locations

use std::path::PathBuf;

use crate::constants::ui;

/// Base config directory (`~/.parley`), falling back to the current directory
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(ui::CONFIG_DIR_NAME)
}

/// Default config file (`~/.parley/config.toml`)
pub fn config_file() -> PathBuf {
    config_dir().join(ui::CONFIG_FILE_NAME)
}

/// Log directory (`~/.parley/logs`)
pub fn logs_dir() -> PathBuf {
    config_dir().join(ui::LOGS_DIR_NAME)
}
