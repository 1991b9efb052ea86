//! Configuration validation

use crate::schema::{RawConfig, RawFeedConfig, RawSchedulerConfig};
use crate::settings::{DEFAULT_FALLBACK_SECS, DEFAULT_MIN_DELAY_SECS};
use thiserror::Error;
use url::Url;

/// Longest range of days the feed may be asked for
pub const MAX_DAYS_AHEAD: u32 = 62;

/// Longest permitted fetch timeout
pub const MAX_FETCH_TIMEOUT_SECS: u64 = 600;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Invalid feed URL '{value}': {message}")]
    InvalidFeedUrl { value: String, message: String },

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("fallback_seconds ({fallback}) must not be below min_delay_seconds ({min_delay})")]
    FallbackBelowMinDelay { fallback: u64, min_delay: u64 },
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    errors.extend(validate_feed(&config.feed));
    errors.extend(validate_scheduler(&config.scheduler));
    errors
}

fn validate_feed(feed: &RawFeedConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(url) = &feed.url
        && let Err(message) = check_feed_url(url)
    {
        errors.push(ValidationError::InvalidFeedUrl {
            value: url.clone(),
            message,
        });
    }

    if let Some(days) = feed.days_ahead {
        errors.extend(check_range("feed.days_ahead", days as u64, 1, MAX_DAYS_AHEAD as u64));
    }

    if let Some(timeout) = feed.fetch_timeout_seconds {
        errors.extend(check_range(
            "feed.fetch_timeout_seconds",
            timeout,
            1,
            MAX_FETCH_TIMEOUT_SECS,
        ));
    }

    errors
}

fn validate_scheduler(scheduler: &RawSchedulerConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    // A zero buffer would re-select the event that just started
    if let Some(buffer) = scheduler.buffer_seconds {
        errors.extend(check_range("scheduler.buffer_seconds", buffer, 1, 3600));
    }

    if let Some(min_delay) = scheduler.min_delay_seconds {
        errors.extend(check_range("scheduler.min_delay_seconds", min_delay, 1, 3600));
    }

    let fallback = scheduler.fallback_seconds.unwrap_or(DEFAULT_FALLBACK_SECS);
    let min_delay = scheduler.min_delay_seconds.unwrap_or(DEFAULT_MIN_DELAY_SECS);
    if fallback < min_delay {
        errors.push(ValidationError::FallbackBelowMinDelay {
            fallback,
            min_delay,
        });
    }

    errors
}

fn check_range(field: &'static str, value: u64, min: u64, max: u64) -> Option<ValidationError> {
    if value < min || value > max {
        Some(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    } else {
        None
    }
}

/// Check that a feed URL is an absolute http(s) URL with a host
pub fn check_feed_url(value: &str) -> Result<(), String> {
    let url = Url::parse(value).map_err(|e| e.to_string())?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme '{}', expected http or https", url.scheme()));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err("missing host".into());
    }

    Ok(())
}
