//! Default paths for spectrumd components
//!
//! Paths are user-writable by default (no root required):
//! - Config: `$XDG_CONFIG_HOME/spectrum/config.toml` or `~/.config/spectrum/config.toml`
//! - Socket: `$XDG_RUNTIME_DIR/spectrumd/spectrumd.sock` or `/tmp/spectrumd-$USER/spectrumd.sock`
//! - Data: `$XDG_DATA_HOME/spectrumd` or `~/.local/share/spectrumd`
//! - Logs: `$XDG_STATE_HOME/spectrumd` or `~/.local/state/spectrumd`

use std::path::PathBuf;

/// Environment variable for overriding the socket path
pub const SPECTRUM_SOCKET_ENV: &str = "SPECTRUM_SOCKET";

/// Environment variable for overriding the data directory
pub const SPECTRUM_DATA_DIR_ENV: &str = "SPECTRUM_DATA_DIR";

const SOCKET_FILENAME: &str = "spectrumd.sock";

const APP_DIR: &str = "spectrumd";

const CONFIG_DIR: &str = "spectrum";

/// Get the default configuration file path.
pub fn default_config_path() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(CONFIG_DIR).join("config.toml");
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(CONFIG_DIR)
            .join("config.toml");
    }

    PathBuf::from("/etc").join(CONFIG_DIR).join("config.toml")
}

/// Get the default socket path.
///
/// Order of precedence:
/// 1. `$SPECTRUM_SOCKET` environment variable (if set)
/// 2. `$XDG_RUNTIME_DIR/spectrumd/spectrumd.sock` (if XDG_RUNTIME_DIR is set)
/// 3. `/tmp/spectrumd-$USER/spectrumd.sock` (fallback)
pub fn default_socket_path() -> PathBuf {
    if let Ok(path) = std::env::var(SPECTRUM_SOCKET_ENV) {
        return PathBuf::from(path);
    }

    socket_path_without_env()
}

/// Get the socket path without checking the `SPECTRUM_SOCKET` env var.
/// Used for config defaults where the env var is applied by the CLI.
pub fn socket_path_without_env() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(APP_DIR).join(SOCKET_FILENAME);
    }

    let username = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/{}-{}", APP_DIR, username)).join(SOCKET_FILENAME)
}

/// Get the default data directory (holds the SQLite database).
///
/// Order of precedence:
/// 1. `$SPECTRUM_DATA_DIR` environment variable (if set)
/// 2. `$XDG_DATA_HOME/spectrumd` (if XDG_DATA_HOME is set)
/// 3. `~/.local/share/spectrumd` (fallback)
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(SPECTRUM_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Get the data directory without checking the `SPECTRUM_DATA_DIR` env var.
pub fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR);
    }

    PathBuf::from("/tmp").join(APP_DIR).join("data")
}
