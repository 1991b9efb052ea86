//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Service-level settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Remote timetable feed
    #[serde(default)]
    pub feed: RawFeedConfig,

    /// Notification scheduler timing
    #[serde(default)]
    pub scheduler: RawSchedulerConfig,

    /// Initial preference values
    #[serde(default)]
    pub preferences: RawPreferences,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// IPC socket path
    pub socket_path: Option<PathBuf>,

    /// Data directory for the timetable cache
    pub data_dir: Option<PathBuf>,

    /// TOML file holding `username` and `secret`
    pub credentials_path: Option<PathBuf>,
}

/// Remote timetable feed
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawFeedConfig {
    /// Feed endpoint (http or https)
    pub url: Option<String>,

    /// How many days, starting today, to request
    pub days_ahead: Option<u32>,

    /// Upper bound on a single fetch
    pub fetch_timeout_seconds: Option<u64>,
}

/// Scheduler timing
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawSchedulerConfig {
    /// Wait after an event starts before looking for the next one
    pub buffer_seconds: Option<u64>,

    /// Recheck interval when no event is upcoming today
    pub fallback_seconds: Option<u64>,

    /// Lower bound for any armed timer
    pub min_delay_seconds: Option<u64>,
}

/// Preference defaults (can be toggled at runtime)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawPreferences {
    pub show_cancelled: Option<bool>,
    pub notifications_enabled: Option<bool>,
}
