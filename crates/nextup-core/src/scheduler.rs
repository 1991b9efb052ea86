//! Self-rescheduling "next event" notification
//!
//! The scheduler owns at most one pending timer. Each firing re-derives the
//! next event from the current snapshot, updates or clears the notification,
//! and arms the following timer:
//!
//! ```text
//! Idle --kick_now--> Armed --fire--> (decide) --> Armed
//!   ^                |   ^
//!   |                +---+ reschedule_now
//!   +-----cancel-----+
//! ```

use chrono::NaiveDateTime;
use nextup_api::{Event, NotificationContent, SchedulerState, SchedulerStatus};
use nextup_config::SchedulerConfig;
use nextup_host_api::{NotificationSink, Preferences, TimerHandle, TimerSubstrate};
use nextup_util::Clock;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::{select_next, CoreEvent, CoreEventSender, SnapshotCell};

#[derive(Debug, Clone, Copy)]
struct PendingTimer {
    handle: TimerHandle,
    due_at: NaiveDateTime,
}

#[derive(Debug, Default)]
struct SchedulerInner {
    pending: Option<PendingTimer>,
    showing: Option<Event>,
}

/// Collaborators the scheduler drives
pub struct SchedulerHost {
    pub timer: Arc<dyn TimerSubstrate>,
    pub sink: Arc<dyn NotificationSink>,
    pub preferences: Arc<dyn Preferences>,
    pub clock: Arc<dyn Clock>,
}

/// The notification scheduler
pub struct NotificationScheduler {
    inner: Mutex<SchedulerInner>,
    host: SchedulerHost,
    snapshot: Arc<SnapshotCell>,
    config: SchedulerConfig,
    events: CoreEventSender,
}

impl NotificationScheduler {
    pub fn new(
        host: SchedulerHost,
        snapshot: Arc<SnapshotCell>,
        config: SchedulerConfig,
        events: CoreEventSender,
    ) -> Self {
        info!(
            buffer_secs = config.buffer.as_secs(),
            fallback_secs = config.fallback.as_secs(),
            "Notification scheduler initialized"
        );

        Self {
            inner: Mutex::new(SchedulerInner::default()),
            host,
            snapshot,
            config,
            events,
        }
    }

    /// Arm the timer with the minimum delay unless one is already pending.
    ///
    /// Returns true if a timer was armed by this call.
    pub fn kick_now(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();

        if !self.host.preferences.notifications_enabled() {
            debug!("Notifications disabled, kick ignored");
            return false;
        }

        if let Some(pending) = inner.pending {
            debug!(timer = %pending.handle, "Timer already pending, kick ignored");
            return false;
        }

        self.arm(&mut inner, self.config.min_delay).is_some()
    }

    /// Replace any pending timer with one at the minimum delay, so the next
    /// decision cycle runs against the current snapshot.
    ///
    /// Still at most one pending timer; the replaced handle becomes stale.
    /// Returns true if a timer was armed by this call.
    pub fn reschedule_now(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();

        if !self.host.preferences.notifications_enabled() {
            debug!("Notifications disabled, reschedule ignored");
            return false;
        }

        if let Some(pending) = inner.pending.take() {
            self.host.timer.cancel(&pending.handle);
            debug!(timer = %pending.handle, "Pending timer replaced");
        }

        self.arm(&mut inner, self.config.min_delay).is_some()
    }

    /// Run one decision cycle for a fired timer.
    ///
    /// Handles other than the pending one are ignored, so a fire that races a
    /// `cancel` or a newer arm has no effect.
    pub fn on_fire(&self, handle: TimerHandle) {
        let mut inner = self.inner.lock().unwrap();

        match inner.pending {
            Some(pending) if pending.handle == handle => {
                inner.pending = None;
            }
            _ => {
                debug!(timer = %handle, "Ignoring stale timer");
                return;
            }
        }

        if !self.host.preferences.notifications_enabled() {
            info!("Notifications disabled, stopping scheduler");
            self.teardown(&mut inner);
            return;
        }

        let now = self.host.clock.now();
        let snapshot = self.snapshot.load();
        let include_cancelled = self.host.preferences.show_cancelled();
        let next = snapshot
            .as_deref()
            .and_then(|s| select_next(now, &s.timetable, include_cancelled))
            .cloned();

        match next {
            Some(event) => {
                let content = NotificationContent::for_event(&event);
                if let Err(e) = self.host.sink.issue(&content) {
                    warn!(error = %e, "Failed to issue notification");
                }

                // Wake just after the event started so the following one takes over
                let until_start = (event.start - now).to_std().unwrap_or(Duration::ZERO);
                let delay = until_start.saturating_add(self.config.buffer);

                info!(
                    event = %event.title,
                    start = %event.start,
                    delay_secs = delay.as_secs(),
                    "Notification issued"
                );

                if let Some(next_wake) = self.arm(&mut inner, delay) {
                    self.emit(CoreEvent::NotificationIssued {
                        event: event.clone(),
                        next_wake,
                    });
                }
                inner.showing = Some(event);
            }
            None => {
                if let Err(e) = self.host.sink.cancel() {
                    warn!(error = %e, "Failed to clear notification");
                }
                inner.showing = None;

                debug!(
                    cache_populated = snapshot.is_some(),
                    "No upcoming event today"
                );

                let next_wake = self.arm(&mut inner, self.config.fallback);
                self.emit(CoreEvent::NotificationCleared { next_wake });
            }
        }
    }

    /// Tear down the pending timer and the notification. Idempotent.
    ///
    /// Returns true if anything was torn down.
    pub fn cancel(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        self.teardown(&mut inner)
    }

    /// Current state for the control surface
    pub fn status(&self) -> SchedulerStatus {
        let inner = self.inner.lock().unwrap();
        SchedulerStatus {
            state: if inner.pending.is_some() {
                SchedulerState::Armed
            } else {
                SchedulerState::Idle
            },
            enabled: self.host.preferences.notifications_enabled(),
            pending_timer: inner.pending.map(|p| p.handle.id()),
            due_at: inner.pending.map(|p| p.due_at),
            showing: inner.showing.clone(),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.inner.lock().unwrap().pending.is_some()
    }

    /// Event the notification currently shows
    pub fn showing(&self) -> Option<Event> {
        self.inner.lock().unwrap().showing.clone()
    }

    /// Arm a timer, clamped to the minimum delay. Caller holds the lock and
    /// guarantees nothing is pending.
    fn arm(&self, inner: &mut SchedulerInner, delay: Duration) -> Option<NaiveDateTime> {
        debug_assert!(inner.pending.is_none());
        let delay = delay.max(self.config.min_delay);

        match self.host.timer.arm(delay) {
            Ok(handle) => {
                let due_at = add_delay(self.host.clock.now(), delay);
                inner.pending = Some(PendingTimer { handle, due_at });

                debug!(timer = %handle, delay_secs = delay.as_secs(), due_at = %due_at, "Timer armed");
                self.emit(CoreEvent::Rearmed {
                    timer: handle,
                    delay,
                    due_at,
                });
                Some(due_at)
            }
            Err(e) => {
                error!(error = %e, "Failed to arm timer, scheduler idle until next kick");
                None
            }
        }
    }

    fn teardown(&self, inner: &mut SchedulerInner) -> bool {
        let pending = inner.pending.take();
        let showing = inner.showing.take();

        if let Some(pending) = pending {
            self.host.timer.cancel(&pending.handle);
        }

        if pending.is_none() && showing.is_none() {
            return false;
        }

        if let Err(e) = self.host.sink.cancel() {
            warn!(error = %e, "Failed to clear notification");
        }

        info!("Scheduler stopped");
        self.emit(CoreEvent::SchedulerStopped);
        true
    }

    fn emit(&self, event: CoreEvent) {
        let _ = self.events.send(event);
    }
}

fn add_delay(now: NaiveDateTime, delay: Duration) -> NaiveDateTime {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(NaiveDateTime::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use nextup_api::{ScheduleSnapshot, Timetable};
    use nextup_host_api::{AtomicPreferences, ManualTimer, RecordingSink};
    use nextup_util::ManualClock;
    use tokio::sync::mpsc;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 17)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    struct Harness {
        scheduler: NotificationScheduler,
        timer: Arc<ManualTimer>,
        sink: Arc<RecordingSink>,
        prefs: Arc<AtomicPreferences>,
        clock: Arc<ManualClock>,
        snapshot: Arc<SnapshotCell>,
        events: mpsc::UnboundedReceiver<CoreEvent>,
    }

    impl Harness {
        fn new(now: NaiveDateTime, timetable: Option<Timetable>) -> Self {
            let timer = Arc::new(ManualTimer::new());
            let sink = Arc::new(RecordingSink::new());
            let prefs = Arc::new(AtomicPreferences::default());
            let clock = Arc::new(ManualClock::new(now));
            let snapshot = Arc::new(SnapshotCell::from_cached(
                timetable.map(|t| ScheduleSnapshot::new(t, nextup_util::now())),
            ));
            let (tx, rx) = mpsc::unbounded_channel();

            let scheduler = NotificationScheduler::new(
                SchedulerHost {
                    timer: timer.clone(),
                    sink: sink.clone(),
                    preferences: prefs.clone(),
                    clock: clock.clone(),
                },
                snapshot.clone(),
                SchedulerConfig::default(),
                tx,
            );

            Self {
                scheduler,
                timer,
                sink,
                prefs,
                clock,
                snapshot,
                events: rx,
            }
        }

        /// Fire the pending timer through the scheduler
        fn fire(&self) -> TimerHandle {
            let handle = self.timer.fire_last().expect("no pending timer");
            self.scheduler.on_fire(handle);
            handle
        }

        fn drain_events(&mut self) -> Vec<CoreEvent> {
            let mut out = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                out.push(event);
            }
            out
        }
    }

    fn morning() -> Timetable {
        Timetable::new(vec![
            Event::new(at(9, 0), "Algorithms", "R1.006"),
            Event::new(at(11, 0), "Databases", "R2.010"),
        ])
    }

    #[test]
    fn test_kick_arms_min_delay() {
        let h = Harness::new(at(8, 0), Some(morning()));

        assert!(h.scheduler.kick_now());
        assert_eq!(h.timer.pending(), vec![(TimerHandle::new(1), Duration::from_secs(1))]);
        assert_eq!(h.scheduler.status().state, SchedulerState::Armed);
    }

    #[test]
    fn test_double_kick_leaves_one_timer() {
        let h = Harness::new(at(8, 0), Some(morning()));

        assert!(h.scheduler.kick_now());
        assert!(!h.scheduler.kick_now());
        assert_eq!(h.timer.pending_count(), 1);
        assert_eq!(h.timer.arm_count(), 1);
    }

    #[test]
    fn test_reschedule_replaces_pending_timer() {
        let h = Harness::new(at(8, 0), Some(morning()));
        h.scheduler.kick_now();
        h.fire();
        let (waiting, delay) = h.timer.last_pending().unwrap();
        assert_eq!(delay, Duration::from_secs(3660));

        assert!(h.scheduler.reschedule_now());
        assert_eq!(h.timer.pending_count(), 1);
        let (handle, delay) = h.timer.last_pending().unwrap();
        assert_ne!(handle, waiting);
        assert_eq!(delay, Duration::from_secs(1));

        // The replaced handle is stale
        h.scheduler.on_fire(waiting);
        assert_eq!(h.sink.issued().len(), 1);
        assert_eq!(h.scheduler.status().pending_timer, Some(handle.id()));
    }

    #[test]
    fn test_reschedule_while_disabled_is_noop() {
        let h = Harness::new(at(8, 0), Some(morning()));
        h.prefs.set_notifications_enabled(false);

        assert!(!h.scheduler.reschedule_now());
        assert_eq!(h.timer.arm_count(), 0);
    }

    #[test]
    fn test_fire_issues_and_rearms_after_event_start() {
        let mut h = Harness::new(at(8, 0), Some(morning()));
        h.scheduler.kick_now();
        h.fire();

        let visible = h.sink.visible().unwrap();
        assert_eq!(visible.body, "Algorithms - R1.006 - 09:00");

        // One hour until 09:00 plus the one minute buffer
        let (_, delay) = h.timer.last_pending().unwrap();
        assert_eq!(delay, Duration::from_secs(3600 + 60));
        assert_eq!(h.timer.pending_count(), 1);

        let status = h.scheduler.status();
        assert_eq!(status.showing.unwrap().title, "Algorithms");
        assert_eq!(status.due_at, Some(at(9, 1)));

        let events = h.drain_events();
        assert!(events.iter().any(|e| matches!(
            e,
            CoreEvent::NotificationIssued { event, next_wake } if event.title == "Algorithms" && *next_wake == at(9, 1)
        )));
    }

    #[test]
    fn test_fire_after_start_moves_to_next_event() {
        let h = Harness::new(at(8, 0), Some(morning()));
        h.scheduler.kick_now();
        h.fire();

        h.clock.set(at(9, 1));
        h.fire();

        assert_eq!(h.sink.visible().unwrap().body, "Databases - R2.010 - 11:00");
        let (_, delay) = h.timer.last_pending().unwrap();
        assert_eq!(delay, Duration::from_secs(119 * 60 + 60));
    }

    #[test]
    fn test_no_event_clears_and_uses_fallback() {
        let mut h = Harness::new(at(12, 0), Some(morning()));
        h.scheduler.kick_now();
        h.fire();

        assert!(h.sink.visible().is_none());
        assert_eq!(h.sink.cancel_count(), 1);
        let (_, delay) = h.timer.last_pending().unwrap();
        assert_eq!(delay, Duration::from_secs(3600));
        assert!(h.scheduler.status().showing.is_none());

        let events = h.drain_events();
        assert!(events.iter().any(|e| matches!(
            e,
            CoreEvent::NotificationCleared { next_wake: Some(wake) } if *wake == at(13, 0)
        )));
    }

    #[test]
    fn test_never_populated_cache_uses_fallback() {
        let h = Harness::new(at(8, 0), None);
        h.scheduler.kick_now();
        h.fire();

        assert!(h.sink.issued().is_empty());
        assert_eq!(h.timer.last_pending().unwrap().1, Duration::from_secs(3600));
    }

    #[test]
    fn test_cancelled_events_follow_preference() {
        let timetable = Timetable::new(vec![Event::new(at(10, 0), "Seminar", "R0.001").cancelled()]);

        let h = Harness::new(at(8, 0), Some(timetable.clone()));
        h.scheduler.kick_now();
        h.fire();
        assert!(h.sink.visible().is_none());

        let h = Harness::new(at(8, 0), Some(timetable));
        h.prefs.set_show_cancelled(true);
        h.scheduler.kick_now();
        h.fire();
        assert_eq!(h.sink.visible().unwrap().body, "Seminar - R0.001 - 10:00");
    }

    #[test]
    fn test_stale_fire_is_noop() {
        let h = Harness::new(at(8, 0), Some(morning()));
        h.scheduler.kick_now();
        let (handle, _) = h.timer.last_pending().unwrap();

        assert!(h.scheduler.cancel());
        h.scheduler.on_fire(handle);

        assert!(h.sink.issued().is_empty());
        assert_eq!(h.timer.pending_count(), 0);
        assert_eq!(h.scheduler.status().state, SchedulerState::Idle);
    }

    #[test]
    fn test_old_handle_after_rearm_is_noop() {
        let h = Harness::new(at(8, 0), Some(morning()));
        h.scheduler.kick_now();
        let first = h.fire();

        let issued_before = h.sink.issued().len();
        h.scheduler.on_fire(first);

        assert_eq!(h.sink.issued().len(), issued_before);
        assert_eq!(h.timer.pending_count(), 1);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut h = Harness::new(at(8, 0), Some(morning()));
        h.scheduler.kick_now();
        h.fire();

        assert!(h.scheduler.cancel());
        assert!(h.sink.visible().is_none());
        assert_eq!(h.timer.pending_count(), 0);

        assert!(!h.scheduler.cancel());
        assert_eq!(h.sink.cancel_count(), 1);

        let stopped = h
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, CoreEvent::SchedulerStopped))
            .count();
        assert_eq!(stopped, 1);

        // Can be kicked again afterwards
        assert!(h.scheduler.kick_now());
    }

    #[test]
    fn test_disabled_preference_tears_down() {
        let h = Harness::new(at(8, 0), Some(morning()));
        h.scheduler.kick_now();
        h.fire();
        assert!(h.sink.visible().is_some());

        h.prefs.set_notifications_enabled(false);
        h.fire();

        assert!(h.sink.visible().is_none());
        assert_eq!(h.timer.pending_count(), 0);
        assert!(!h.scheduler.kick_now());

        let status = h.scheduler.status();
        assert!(!status.enabled);
        assert_eq!(status.state, SchedulerState::Idle);
    }

    #[test]
    fn test_sink_failure_still_rearms() {
        let h = Harness::new(at(8, 0), Some(morning()));
        h.sink.set_fail(true);
        h.scheduler.kick_now();
        h.fire();

        assert!(h.sink.issued().is_empty());
        assert_eq!(h.timer.pending_count(), 1);
        assert!(h.scheduler.is_armed());
    }

    #[test]
    fn test_new_snapshot_seen_on_next_fire() {
        let h = Harness::new(at(8, 0), None);
        h.scheduler.kick_now();
        h.fire();
        assert!(h.sink.visible().is_none());

        h.snapshot.replace(Arc::new(ScheduleSnapshot::new(morning(), nextup_util::now())));
        h.fire();
        assert_eq!(h.sink.visible().unwrap().body, "Algorithms - R1.006 - 09:00");
    }

    #[test]
    fn test_delay_clamped_to_minimum() {
        let h = Harness::new(at(8, 0), Some(morning()));
        let config = SchedulerConfig {
            buffer: Duration::ZERO,
            fallback: Duration::ZERO,
            min_delay: Duration::from_secs(5),
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        let scheduler = NotificationScheduler::new(
            SchedulerHost {
                timer: h.timer.clone(),
                sink: h.sink.clone(),
                preferences: h.prefs.clone(),
                clock: h.clock.clone(),
            },
            h.snapshot.clone(),
            config,
            tx,
        );

        h.clock.set(at(12, 0));
        scheduler.kick_now();
        let handle = h.timer.fire_last().unwrap();
        scheduler.on_fire(handle);

        assert_eq!(h.timer.last_pending().unwrap().1, Duration::from_secs(5));
    }
}
