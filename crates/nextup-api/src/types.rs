//! Shared types for the timetable model

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single scheduled timetable entry.
///
/// Identity is structural: two events with the same start, title and
/// location are the same event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event {
    /// Local wall-clock start time
    pub start: NaiveDateTime,
    pub title: String,
    pub location: String,
    #[serde(default)]
    pub cancelled: bool,
}

impl Event {
    pub fn new(
        start: NaiveDateTime,
        title: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            start,
            title: title.into(),
            location: location.into(),
            cancelled: false,
        }
    }

    pub fn cancelled(mut self) -> Self {
        self.cancelled = true;
        self
    }

    pub fn day(&self) -> NaiveDate {
        self.start.date()
    }
}

/// Sequence of events as produced by the remote source.
///
/// Order is whatever the source delivered; nothing downstream may rely on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timetable {
    events: Vec<Event>,
}

impl Timetable {
    pub fn new(events: Vec<Event>) -> Self {
        Self { events }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events ordered by start time (stable for equal starts)
    pub fn sorted_by_start(&self) -> Vec<&Event> {
        let mut events: Vec<&Event> = self.events.iter().collect();
        events.sort_by_key(|e| e.start);
        events
    }

    /// Same events regardless of order
    pub fn same_events(&self, other: &Timetable) -> bool {
        if self.len() != other.len() {
            return false;
        }
        let mut ours: Vec<&Event> = self.events.iter().collect();
        let mut theirs: Vec<&Event> = other.events.iter().collect();
        ours.sort_by(|a, b| event_sort_key(a).cmp(&event_sort_key(b)));
        theirs.sort_by(|a, b| event_sort_key(a).cmp(&event_sort_key(b)));
        ours == theirs
    }
}

fn event_sort_key(e: &Event) -> (NaiveDateTime, &str, &str, bool) {
    (e.start, e.title.as_str(), e.location.as_str(), e.cancelled)
}

impl FromIterator<Event> for Timetable {
    fn from_iter<I: IntoIterator<Item = Event>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Cached timetable as of the last successful refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSnapshot {
    /// When this snapshot was written
    pub written_at: DateTime<Local>,
    pub timetable: Timetable,
}

impl ScheduleSnapshot {
    pub fn new(timetable: Timetable, written_at: DateTime<Local>) -> Self {
        Self {
            written_at,
            timetable,
        }
    }
}

/// Username/secret pair borrowed from the credential source for one fetch.
///
/// Never serialized by nextup; the secret is redacted from debug output.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credential {
    username: String,
    secret: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Fixed id of the single "next event" notification
pub const NOTIFICATION_ID: u32 = 2;

/// Content title of the "next event" notification
pub const NOTIFICATION_TITLE: &str = "Next event";

/// Notification priority hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    Normal,
    High,
}

/// What the visible notification shows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationContent {
    pub id: u32,
    pub title: String,
    pub body: String,
    /// Persistent until replaced or cancelled
    pub ongoing: bool,
    pub priority: NotificationPriority,
}

impl NotificationContent {
    /// Build the "next event" notification: `<title> - <location> - <HH:MM>`
    pub fn for_event(event: &Event) -> Self {
        Self {
            id: NOTIFICATION_ID,
            title: NOTIFICATION_TITLE.to_string(),
            body: format!(
                "{} - {} - {}",
                event.title,
                event.location,
                nextup_util::format_clock_time(&event.start)
            ),
            ongoing: true,
            priority: NotificationPriority::Low,
        }
    }
}

/// Notification scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// No timer pending
    Idle,
    /// Exactly one timer pending
    Armed,
}

/// Point-in-time view of the notification scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    pub enabled: bool,
    /// Opaque id of the pending timer
    pub pending_timer: Option<u64>,
    /// When the pending timer is due
    pub due_at: Option<NaiveDateTime>,
    /// Event currently shown in the notification
    pub showing: Option<Event>,
}

/// Overall service status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub api_version: u32,
    /// Whether the cache was ever populated
    pub cache_populated: bool,
    pub snapshot_written_at: Option<DateTime<Local>>,
    pub event_count: usize,
    pub refresh_in_flight: bool,
    pub scheduler: SchedulerStatus,
}
