//! Validated settings structures

use crate::schema::{RawConfig, RawFeedConfig, RawPreferences, RawSchedulerConfig, RawServiceConfig};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DAYS_AHEAD: u32 = 7;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_BUFFER_SECS: u64 = 60;
pub const DEFAULT_FALLBACK_SECS: u64 = 3600;
pub const DEFAULT_MIN_DELAY_SECS: u64 = 1;

/// Validated settings ready for use by the service
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub service: ServiceConfig,
    pub feed: FeedConfig,
    pub scheduler: SchedulerConfig,
    pub preferences: PreferenceDefaults,
}

impl Settings {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            service: ServiceConfig::from_raw(raw.service),
            feed: FeedConfig::from_raw(raw.feed),
            scheduler: SchedulerConfig::from_raw(raw.scheduler),
            preferences: PreferenceDefaults::from_raw(raw.preferences),
        }
    }
}

/// Service paths
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub socket_path: PathBuf,
    pub data_dir: PathBuf,
    pub credentials_path: PathBuf,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            socket_path: raw
                .socket_path
                .unwrap_or_else(nextup_util::default_socket_path),
            data_dir: raw.data_dir.unwrap_or_else(nextup_util::default_data_dir),
            credentials_path: raw
                .credentials_path
                .unwrap_or_else(nextup_util::default_credentials_path),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_raw(RawServiceConfig::default())
    }
}

/// Remote timetable feed
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// None until the user configures an endpoint
    pub url: Option<String>,
    pub days_ahead: u32,
    pub fetch_timeout: Duration,
}

impl FeedConfig {
    fn from_raw(raw: RawFeedConfig) -> Self {
        Self {
            url: raw.url,
            days_ahead: raw.days_ahead.unwrap_or(DEFAULT_DAYS_AHEAD),
            fetch_timeout: Duration::from_secs(
                raw.fetch_timeout_seconds
                    .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS),
            ),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self::from_raw(RawFeedConfig::default())
    }
}

/// Notification scheduler timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Added to the time until the next event so the scheduler wakes after it started
    pub buffer: Duration,
    /// Delay used when no event is upcoming today
    pub fallback: Duration,
    /// Lower bound for every armed timer
    pub min_delay: Duration,
}

impl SchedulerConfig {
    fn from_raw(raw: RawSchedulerConfig) -> Self {
        Self {
            buffer: Duration::from_secs(raw.buffer_seconds.unwrap_or(DEFAULT_BUFFER_SECS)),
            fallback: Duration::from_secs(raw.fallback_seconds.unwrap_or(DEFAULT_FALLBACK_SECS)),
            min_delay: Duration::from_secs(
                raw.min_delay_seconds.unwrap_or(DEFAULT_MIN_DELAY_SECS),
            ),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from_raw(RawSchedulerConfig::default())
    }
}

/// Initial preference values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreferenceDefaults {
    pub show_cancelled: bool,
    pub notifications_enabled: bool,
}

impl PreferenceDefaults {
    fn from_raw(raw: RawPreferences) -> Self {
        Self {
            show_cancelled: raw.show_cancelled.unwrap_or(false),
            notifications_enabled: raw.notifications_enabled.unwrap_or(true),
        }
    }
}

impl Default for PreferenceDefaults {
    fn default() -> Self {
        Self::from_raw(RawPreferences::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.buffer, Duration::from_secs(60));
        assert_eq!(config.fallback, Duration::from_secs(3600));
        assert_eq!(config.min_delay, Duration::from_secs(1));
    }

    #[test]
    fn preference_defaults() {
        let prefs = PreferenceDefaults::default();
        assert!(!prefs.show_cancelled);
        assert!(prefs.notifications_enabled);
    }

    #[test]
    fn feed_defaults() {
        let feed = FeedConfig::default();
        assert!(feed.url.is_none());
        assert_eq!(feed.days_ahead, DEFAULT_DAYS_AHEAD);
        assert_eq!(feed.fetch_timeout, Duration::from_secs(30));
    }
}
