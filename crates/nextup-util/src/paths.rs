//! Default paths for nextup components
//!
//! Paths are user-writable (no root required):
//! - Socket: `$XDG_RUNTIME_DIR/nextup/nextupd.sock` or `/tmp/nextup-$USER/nextupd.sock`
//! - Config: `$XDG_CONFIG_HOME/nextup/config.toml` or `~/.config/nextup/config.toml`
//! - Data: `$XDG_DATA_HOME/nextup` or `~/.local/share/nextup`

use std::path::PathBuf;

/// Environment variable for overriding the socket path
pub const NEXTUP_SOCKET_ENV: &str = "NEXTUP_SOCKET";

/// Environment variable for overriding the data directory
pub const NEXTUP_DATA_DIR_ENV: &str = "NEXTUP_DATA_DIR";

/// Environment variable for overriding the config file
pub const NEXTUP_CONFIG_ENV: &str = "NEXTUP_CONFIG";

const SOCKET_FILENAME: &str = "nextupd.sock";
const CONFIG_FILENAME: &str = "config.toml";
const CREDENTIALS_FILENAME: &str = "credentials.toml";
const DATABASE_FILENAME: &str = "nextup.db";
const APP_DIR: &str = "nextup";

/// Get the default socket path.
///
/// Order of precedence:
/// 1. `$NEXTUP_SOCKET`
/// 2. `$XDG_RUNTIME_DIR/nextup/nextupd.sock`
/// 3. `/tmp/nextup-$USER/nextupd.sock`
pub fn default_socket_path() -> PathBuf {
    if let Ok(path) = std::env::var(NEXTUP_SOCKET_ENV) {
        return PathBuf::from(path);
    }

    socket_path_without_env()
}

/// Get the socket path without checking NEXTUP_SOCKET.
pub fn socket_path_without_env() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(APP_DIR).join(SOCKET_FILENAME);
    }

    let username = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/{}-{}", APP_DIR, username)).join(SOCKET_FILENAME)
}

/// Get the default config directory.
pub fn default_config_dir() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".config").join(APP_DIR);
    }

    PathBuf::from("/tmp").join(APP_DIR).join("config")
}

/// Get the default config file path (`$NEXTUP_CONFIG` wins if set).
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(NEXTUP_CONFIG_ENV) {
        return PathBuf::from(path);
    }

    default_config_dir().join(CONFIG_FILENAME)
}

/// Get the default credentials file path.
///
/// Credentials live next to the config, never in the data directory.
pub fn default_credentials_path() -> PathBuf {
    default_config_dir().join(CREDENTIALS_FILENAME)
}

/// Get the default data directory.
///
/// Order of precedence:
/// 1. `$NEXTUP_DATA_DIR`
/// 2. `$XDG_DATA_HOME/nextup`
/// 3. `~/.local/share/nextup`
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(NEXTUP_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Get the data directory without checking NEXTUP_DATA_DIR.
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

/// Database file inside a data directory
pub fn database_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join(DATABASE_FILENAME)
}
