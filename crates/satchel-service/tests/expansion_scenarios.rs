//! Scenario table for window expansion and exception merging.

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use uuid::Uuid;

use satchel_db::model::event::CalendarEvent;
use satchel_service::calendar::query::resolve_window;
use satchel_service::calendar::types::{EventFilters, QueryWindow};

struct Scenario {
    name: &'static str,
    rule: &'static str,
    /// (original_start, cancelled, moved_to)
    exceptions: &'static [(&'static str, bool, Option<&'static str>)],
    window: (&'static str, &'static str),
    expected_starts: &'static [&'static str],
}

fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "weekly_monday_count_4",
            rule: "FREQ=WEEKLY;COUNT=4",
            exceptions: &[],
            window: ("2025-01-01T00:00:00Z", "2025-02-01T00:00:00Z"),
            expected_starts: &[
                "2025-01-06T09:00:00Z",
                "2025-01-13T09:00:00Z",
                "2025-01-20T09:00:00Z",
                "2025-01-27T09:00:00Z",
            ],
        },
        Scenario {
            name: "deleted_occurrence_removes_one_slot",
            rule: "FREQ=WEEKLY;COUNT=4",
            exceptions: &[("2025-01-13T09:00:00Z", true, None)],
            window: ("2025-01-01T00:00:00Z", "2025-02-01T00:00:00Z"),
            expected_starts: &[
                "2025-01-06T09:00:00Z",
                "2025-01-20T09:00:00Z",
                "2025-01-27T09:00:00Z",
            ],
        },
        Scenario {
            name: "moved_occurrence_keeps_siblings",
            rule: "FREQ=WEEKLY;COUNT=4",
            exceptions: &[("2025-01-20T09:00:00Z", false, Some("2025-01-20T15:00:00Z"))],
            window: ("2025-01-01T00:00:00Z", "2025-02-01T00:00:00Z"),
            expected_starts: &[
                "2025-01-06T09:00:00Z",
                "2025-01-13T09:00:00Z",
                "2025-01-20T15:00:00Z",
                "2025-01-27T09:00:00Z",
            ],
        },
        Scenario {
            name: "delete_and_move_combined",
            rule: "FREQ=WEEKLY;COUNT=4",
            exceptions: &[
                ("2025-01-13T09:00:00Z", true, None),
                ("2025-01-20T09:00:00Z", false, Some("2025-01-20T15:00:00Z")),
            ],
            window: ("2025-01-01T00:00:00Z", "2025-02-01T00:00:00Z"),
            expected_starts: &[
                "2025-01-06T09:00:00Z",
                "2025-01-20T15:00:00Z",
                "2025-01-27T09:00:00Z",
            ],
        },
        Scenario {
            name: "narrow_window_clips_series",
            rule: "FREQ=WEEKLY;COUNT=4",
            exceptions: &[],
            window: ("2025-01-10T00:00:00Z", "2025-01-21T00:00:00Z"),
            expected_starts: &["2025-01-13T09:00:00Z", "2025-01-20T09:00:00Z"],
        },
        Scenario {
            name: "daily_interval_two",
            rule: "FREQ=DAILY;INTERVAL=2;COUNT=3",
            exceptions: &[],
            window: ("2025-01-01T00:00:00Z", "2025-02-01T00:00:00Z"),
            expected_starts: &[
                "2025-01-06T09:00:00Z",
                "2025-01-08T09:00:00Z",
                "2025-01-10T09:00:00Z",
            ],
        },
        Scenario {
            name: "until_bound_stops_series",
            rule: "FREQ=WEEKLY;UNTIL=20250120T090000Z",
            exceptions: &[],
            window: ("2025-01-01T00:00:00Z", "2025-03-01T00:00:00Z"),
            expected_starts: &[
                "2025-01-06T09:00:00Z",
                "2025-01-13T09:00:00Z",
                "2025-01-20T09:00:00Z",
            ],
        },
        Scenario {
            name: "window_outside_series_is_empty",
            rule: "FREQ=WEEKLY;COUNT=4",
            exceptions: &[],
            window: ("2025-06-01T00:00:00Z", "2025-07-01T00:00:00Z"),
            expected_starts: &[],
        },
    ]
}

fn instant(text: &str) -> DateTime<Utc> {
    text.parse::<DateTime<Utc>>()
        .unwrap_or_else(|err| panic!("bad test instant {text}: {err}"))
}

fn monday_root(rule: &str) -> CalendarEvent {
    let start = Utc
        .with_ymd_and_hms(2025, 1, 6, 9, 0, 0)
        .single()
        .expect("valid instant");
    CalendarEvent {
        id: Uuid::new_v4(),
        title: "Maths".to_string(),
        description: None,
        event_type: "lesson".to_string(),
        color: None,
        start_at: start,
        end_at: Some(start + TimeDelta::hours(1)),
        timezone: None,
        all_day: false,
        recurrence_rule: Some(rule.to_string()),
        subject_id: None,
        created_by: Uuid::new_v4(),
        parent_id: None,
        is_exception: false,
        exception_original_start: None,
        is_cancelled: false,
        created_at: start,
        updated_at: start,
    }
}

#[test_log::test]
fn expansion_scenarios() {
    for scenario in scenarios() {
        let root = monday_root(scenario.rule);

        let exceptions: Vec<CalendarEvent> = scenario
            .exceptions
            .iter()
            .map(|(slot, cancelled, moved_to)| {
                let slot = instant(slot);
                let start_at = moved_to.map_or(slot, instant);
                CalendarEvent {
                    id: Uuid::new_v4(),
                    recurrence_rule: None,
                    parent_id: Some(root.id),
                    is_exception: true,
                    exception_original_start: Some(slot),
                    is_cancelled: *cancelled,
                    start_at,
                    end_at: Some(start_at + TimeDelta::hours(1)),
                    ..root.clone()
                }
            })
            .collect();

        let window = QueryWindow::new(instant(scenario.window.0), instant(scenario.window.1))
            .unwrap_or_else(|err| panic!("{}: bad window: {err}", scenario.name));

        let resolved = resolve_window(&[], &[root], &exceptions, window, &EventFilters::default(), 1000)
            .unwrap_or_else(|err| panic!("{}: resolution failed: {err}", scenario.name));

        let starts: Vec<DateTime<Utc>> = resolved.iter().map(|o| o.start_at).collect();
        let expected: Vec<DateTime<Utc>> =
            scenario.expected_starts.iter().map(|s| instant(s)).collect();
        assert_eq!(starts, expected, "scenario {}", scenario.name);
    }
}
