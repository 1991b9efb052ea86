//! Event types for nextupd -> client streaming

use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::{ErrorCode, Event, API_VERSION};

/// Service event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEvent {
    pub api_version: u32,
    pub timestamp: DateTime<Local>,
    pub payload: ServiceEventPayload,
}

impl ServiceEvent {
    pub fn new(payload: ServiceEventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: nextup_util::now(),
            payload,
        }
    }
}

/// All possible events from the service to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServiceEventPayload {
    /// The cached timetable was replaced by a fresh one
    SnapshotReplaced {
        written_at: DateTime<Local>,
        event_count: usize,
    },

    /// A refresh attempt failed; the cache is unchanged
    RefreshFailed { code: ErrorCode, message: String },

    /// The notification now points at this event
    NotificationIssued {
        event: Event,
        next_wake: NaiveDateTime,
    },

    /// No upcoming event today; notification removed
    NotificationCleared { next_wake: Option<NaiveDateTime> },
}
