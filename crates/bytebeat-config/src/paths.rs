//! Platform-specific configuration paths.
//!
//! - Linux: `~/.config/bytebeat/config.toml`
//! - macOS: `~/Library/Application Support/bytebeat/config.toml`
//! - Windows: `%APPDATA%\bytebeat\config.toml`

use std::path::PathBuf;

/// Application name used for directory paths.
const APP_NAME: &str = "bytebeat";

/// File name of the user configuration.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Returns the user-specific configuration directory.
///
/// Returns a fallback path if the config directory cannot be determined.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Returns the path of the user configuration file. It may not exist.
pub fn user_config_file() -> PathBuf {
    user_config_dir().join(CONFIG_FILE_NAME)
}
