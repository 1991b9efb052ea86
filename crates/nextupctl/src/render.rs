//! Plain-text rendering of daemon replies

use chrono::{DateTime, Local};
use nextup_api::{ErrorCode, ErrorInfo, Event, SchedulerState, ServiceEventPayload, ServiceStatus};
use nextup_util::{format_clock_time, format_datetime_full};

/// One timetable line: `2025-03-17 09:00  Algorithms @ R1.006`
pub fn format_event(event: &Event) -> String {
    let mut line = format!(
        "{} {}  {} @ {}",
        event.start.date(),
        format_clock_time(&event.start),
        event.title,
        event.location
    );
    if event.cancelled {
        line.push_str("  (cancelled)");
    }
    line
}

pub fn format_written_at(written_at: Option<DateTime<Local>>) -> String {
    match written_at {
        Some(at) => format_datetime_full(&at.naive_local()),
        None => "never".to_string(),
    }
}

pub fn format_status(status: &ServiceStatus) -> Vec<String> {
    let scheduler = &status.scheduler;
    let mut lines = vec![
        format!("API version:   {}", status.api_version),
        format!(
            "Timetable:     {} events, written {}",
            status.event_count,
            format_written_at(status.snapshot_written_at)
        ),
        format!(
            "Refresh:       {}",
            if status.refresh_in_flight { "in flight" } else { "idle" }
        ),
        format!(
            "Notifications: {}",
            if scheduler.enabled { "enabled" } else { "disabled" }
        ),
    ];

    let state = match (scheduler.state, scheduler.due_at) {
        (SchedulerState::Armed, Some(due_at)) => format!("armed, wakes {}", format_datetime_full(&due_at)),
        (SchedulerState::Armed, None) => "armed".to_string(),
        (SchedulerState::Idle, _) => "idle".to_string(),
    };
    lines.push(format!("Scheduler:     {}", state));

    if let Some(event) = &scheduler.showing {
        lines.push(format!("Showing:       {}", format_event(event)));
    }

    lines
}

/// Message for a failed request; refresh failures get their own wording
pub fn describe_error(error: &ErrorInfo) -> String {
    match error.code {
        ErrorCode::Unauthenticated => {
            "No credentials stored; add them to the credentials file first".to_string()
        }
        ErrorCode::AuthenticationRejected => {
            "The timetable source rejected the stored credentials".to_string()
        }
        ErrorCode::FetchFailed => format!("Could not reach the timetable source: {}", error.message),
        ErrorCode::ParseFailed => format!("Timetable source sent an unreadable reply: {}", error.message),
        ErrorCode::CacheWriteFailed => format!("Could not save the timetable: {}", error.message),
        _ => error.message.clone(),
    }
}

pub fn format_service_event(payload: &ServiceEventPayload) -> String {
    match payload {
        ServiceEventPayload::SnapshotReplaced {
            written_at,
            event_count,
        } => format!(
            "timetable replaced: {} events at {}",
            event_count,
            format_datetime_full(&written_at.naive_local())
        ),
        ServiceEventPayload::RefreshFailed { code, message } => {
            format!("refresh failed ({:?}): {}", code, message)
        }
        ServiceEventPayload::NotificationIssued { event, next_wake } => format!(
            "showing {}; next wake {}",
            format_event(event),
            format_datetime_full(next_wake)
        ),
        ServiceEventPayload::NotificationCleared { next_wake: Some(at) } => format!(
            "nothing upcoming today; next wake {}",
            format_datetime_full(at)
        ),
        ServiceEventPayload::NotificationCleared { next_wake: None } => {
            "notification cleared; scheduler stopped".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use nextup_api::SchedulerStatus;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 17)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn event_lines() {
        let event = Event::new(at(9, 0), "Algorithms", "R1.006");
        assert_eq!(format_event(&event), "2025-03-17 09:00  Algorithms @ R1.006");
        assert_eq!(
            format_event(&event.cancelled()),
            "2025-03-17 09:00  Algorithms @ R1.006  (cancelled)"
        );
    }

    #[test]
    fn status_lines() {
        let status = ServiceStatus {
            api_version: 1,
            cache_populated: false,
            snapshot_written_at: None,
            event_count: 0,
            refresh_in_flight: true,
            scheduler: SchedulerStatus {
                state: SchedulerState::Armed,
                enabled: true,
                pending_timer: Some(4),
                due_at: Some(at(9, 1)),
                showing: Some(Event::new(at(9, 0), "Algorithms", "R1.006")),
            },
        };

        let lines = format_status(&status);
        assert!(lines.contains(&"Timetable:     0 events, written never".to_string()));
        assert!(lines.contains(&"Refresh:       in flight".to_string()));
        assert!(lines.contains(&"Scheduler:     armed, wakes 2025-03-17 09:01:00".to_string()));
        assert_eq!(
            lines.last().unwrap(),
            "Showing:       2025-03-17 09:00  Algorithms @ R1.006"
        );
    }

    #[test]
    fn refresh_errors_are_told_apart() {
        let rejected = ErrorInfo::new(ErrorCode::AuthenticationRejected, "401");
        let missing = ErrorInfo::new(ErrorCode::Unauthenticated, "No stored credential");
        let transport = ErrorInfo::new(ErrorCode::FetchFailed, "Fetch failed: timed out after 30s");

        assert!(describe_error(&rejected).contains("rejected"));
        assert!(describe_error(&missing).contains("No credentials"));
        assert!(describe_error(&transport).ends_with("timed out after 30s"));
        assert_ne!(describe_error(&rejected), describe_error(&missing));
    }

    #[test]
    fn cleared_events() {
        let stopped = ServiceEventPayload::NotificationCleared { next_wake: None };
        assert_eq!(
            format_service_event(&stopped),
            "notification cleared; scheduler stopped"
        );

        let idle = ServiceEventPayload::NotificationCleared {
            next_wake: Some(at(10, 0)),
        };
        assert_eq!(
            format_service_event(&idle),
            "nothing upcoming today; next wake 2025-03-17 10:00:00"
        );
    }
}
