//! Next-event selection

use chrono::{NaiveDate, NaiveDateTime};
use nextup_api::{Event, Timetable};

/// Soonest event starting later today.
///
/// Only events on `now`'s calendar date that have not started yet count.
/// Cancelled events are skipped unless `include_cancelled`. Stored order is
/// irrelevant; among equal starts the first one in the timetable wins.
pub fn select_next(
    now: NaiveDateTime,
    timetable: &Timetable,
    include_cancelled: bool,
) -> Option<&Event> {
    let today = now.date();
    let mut best: Option<&Event> = None;

    for event in timetable.events() {
        if event.start.date() != today || event.start <= now {
            continue;
        }
        if event.cancelled && !include_cancelled {
            continue;
        }
        match best {
            Some(current) if current.start <= event.start => {}
            _ => best = Some(event),
        }
    }

    best
}

/// All events of one day, ordered by start
pub fn events_on(date: NaiveDate, timetable: &Timetable, include_cancelled: bool) -> Vec<&Event> {
    timetable
        .sorted_by_start()
        .into_iter()
        .filter(|e| e.day() == date && (include_cancelled || !e.cancelled))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 17).unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        day().and_hms_opt(h, m, 0).unwrap()
    }

    fn morning() -> Timetable {
        Timetable::new(vec![
            Event::new(at(9, 0), "Algorithms", "R1.006"),
            Event::new(at(11, 0), "Databases", "R2.010"),
        ])
    }

    #[test]
    fn picks_first_upcoming_event() {
        let timetable = morning();
        let next = select_next(at(8, 0), &timetable, false).unwrap();
        assert_eq!(next.title, "Algorithms");
    }

    #[test]
    fn skips_started_events() {
        let timetable = morning();
        let next = select_next(at(9, 30), &timetable, false).unwrap();
        assert_eq!(next.title, "Databases");
    }

    #[test]
    fn event_starting_now_has_started() {
        let timetable = morning();
        let next = select_next(at(9, 0), &timetable, false).unwrap();
        assert_eq!(next.title, "Databases");
    }

    #[test]
    fn cancelled_event_is_skipped() {
        let timetable = Timetable::new(vec![Event::new(at(10, 0), "Seminar", "R0.001").cancelled()]);
        assert!(select_next(at(8, 0), &timetable, false).is_none());

        let next = select_next(at(8, 0), &timetable, true).unwrap();
        assert_eq!(next.title, "Seminar");
    }

    #[test]
    fn other_days_never_count() {
        let tomorrow_early = (day() + Duration::days(1)).and_hms_opt(0, 5, 0).unwrap();
        let timetable = Timetable::new(vec![Event::new(tomorrow_early, "Early", "R1")]);
        assert!(select_next(at(23, 50), &timetable, false).is_none());

        // Same day-of-month in another month is a different day
        let next_month = NaiveDate::from_ymd_opt(2025, 4, 17)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let timetable = Timetable::new(vec![Event::new(next_month, "Later", "R1")]);
        assert!(select_next(at(8, 0), &timetable, false).is_none());
    }

    #[test]
    fn stored_order_is_irrelevant() {
        let timetable = Timetable::new(vec![
            Event::new(at(15, 0), "C", "R3"),
            Event::new(at(11, 0), "B", "R2"),
            Event::new(at(13, 0), "A", "R1"),
        ]);
        assert_eq!(select_next(at(8, 0), &timetable, false).unwrap().title, "B");
    }

    #[test]
    fn tie_goes_to_first_encountered() {
        let timetable = Timetable::new(vec![
            Event::new(at(10, 0), "First", "R1"),
            Event::new(at(10, 0), "Second", "R2"),
        ]);
        assert_eq!(select_next(at(8, 0), &timetable, false).unwrap().title, "First");
    }

    #[test]
    fn empty_timetable() {
        assert!(select_next(at(8, 0), &Timetable::empty(), true).is_none());
    }

    #[test]
    fn events_on_filters_and_sorts() {
        let timetable = Timetable::new(vec![
            Event::new(at(14, 0), "Seminar", "R0.001").cancelled(),
            Event::new(at(11, 0), "Databases", "R2.010"),
            Event::new(at(9, 0), "Algorithms", "R1.006"),
            Event::new(at(9, 0) + Duration::days(1), "Tomorrow", "R1"),
        ]);

        let titles: Vec<&str> = events_on(day(), &timetable, false)
            .iter()
            .map(|e| e.title.as_str())
            .collect();
        assert_eq!(titles, vec!["Algorithms", "Databases"]);

        assert_eq!(events_on(day(), &timetable, true).len(), 3);
        assert!(events_on(day() + Duration::days(2), &timetable, true).is_empty());
    }

    fn arb_event() -> impl Strategy<Value = Event> {
        // Three consecutive days, minute resolution
        (0i64..3, 0u32..24, 0u32..60, any::<bool>()).prop_map(|(d, h, m, cancelled)| {
            let start = (day() + Duration::days(d)).and_hms_opt(h, m, 0).unwrap();
            let event = Event::new(start, format!("E{}{:02}{:02}", d, h, m), "R");
            if cancelled { event.cancelled() } else { event }
        })
    }

    fn arb_now() -> impl Strategy<Value = NaiveDateTime> {
        (0i64..3, 0u32..24, 0u32..60)
            .prop_map(|(d, h, m)| (day() + Duration::days(d)).and_hms_opt(h, m, 0).unwrap())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// A selected event qualifies and nothing qualifying starts before it
        #[test]
        fn prop_selection_is_soonest_qualifying(
            events in prop::collection::vec(arb_event(), 0..20),
            now in arb_now(),
        ) {
            let timetable = Timetable::new(events);
            let qualifies = |e: &Event| e.start > now && !e.cancelled && e.start.date() == now.date();

            match select_next(now, &timetable, false) {
                Some(selected) => {
                    prop_assert!(qualifies(selected));
                    for other in timetable.events().iter().filter(|e| qualifies(*e)) {
                        prop_assert!(other.start >= selected.start);
                    }
                }
                None => {
                    prop_assert!(!timetable.events().iter().any(qualifies));
                }
            }
        }

        /// Reordering the timetable never changes the selected start time
        #[test]
        fn prop_order_independent_start(
            events in prop::collection::vec(arb_event(), 0..20),
            now in arb_now(),
        ) {
            let forward = Timetable::new(events.clone());
            let reversed = Timetable::new(events.into_iter().rev().collect());

            let a = select_next(now, &forward, true).map(|e| e.start);
            let b = select_next(now, &reversed, true).map(|e| e.start);
            prop_assert_eq!(a, b);
        }
    }
}
