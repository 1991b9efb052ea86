//! Core events emitted by the scheduler and the refresh coordinator

use chrono::{DateTime, Local, NaiveDateTime};
use nextup_api::Event;
use nextup_host_api::TimerHandle;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::RefreshError;

/// Events emitted by the core
#[derive(Debug, Clone)]
pub enum CoreEvent {
    /// The notification now shows this event
    NotificationIssued {
        event: Event,
        next_wake: NaiveDateTime,
    },

    /// Nothing upcoming today; notification removed
    NotificationCleared {
        next_wake: Option<NaiveDateTime>,
    },

    /// A new timer is pending
    Rearmed {
        timer: TimerHandle,
        delay: Duration,
        due_at: NaiveDateTime,
    },

    /// Pending timer and notification torn down
    SchedulerStopped,

    /// The cached timetable was replaced
    SnapshotReplaced {
        written_at: DateTime<Local>,
        event_count: usize,
    },

    /// A refresh failed; the cache is unchanged
    RefreshFailed {
        error: RefreshError,
    },
}

pub type CoreEventSender = mpsc::UnboundedSender<CoreEvent>;
