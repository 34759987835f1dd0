//! Calendar query service: answers "what occurs in `[start, end)`".
//!
//! Orchestrates the window fetches, the recurrence expander, and the
//! exception merger, then applies filters and sorts. The resolution step is
//! a pure function over fetched rows so it can be exercised without a
//! database.

use std::collections::HashMap;

use uuid::Uuid;

use crate::calendar::expand;
use crate::calendar::merge::{merge, sort_resolved};
use crate::calendar::types::{EventFilters, QueryWindow, ResolvedOccurrence, SubjectInfo};
use crate::error::{ServiceError, ServiceResult};
use satchel_db::db::connection::DbConnection;
use satchel_db::db::query::{event, subject};
use satchel_db::model::event::CalendarEvent;

/// ## Summary
/// Resolves a query window over already-fetched rows.
///
/// Single events pass through; each recurring root is expanded into the
/// window and merged with its exceptions. A stored rule that no longer
/// parses is logged and skipped rather than failing the whole query:
/// creation validates rules, so a bad rule here is data drift, and one
/// broken series should not take the calendar down.
///
/// ## Errors
/// Returns [`ServiceError::InvalidWindow`] via the window constructor
/// upstream; expansion errors other than parse failures propagate.
pub fn resolve_window(
    singles: &[CalendarEvent],
    roots: &[CalendarEvent],
    exceptions: &[CalendarEvent],
    window: QueryWindow,
    filters: &EventFilters,
    limit: u16,
) -> ServiceResult<Vec<ResolvedOccurrence>> {
    let mut resolved: Vec<ResolvedOccurrence> = singles
        .iter()
        .map(ResolvedOccurrence::single)
        .filter(|occurrence| filters.matches(occurrence))
        .collect();

    if !filters.skip_recurring {
        for root in roots {
            let occurrences = match expand::expand(root, window, limit) {
                Ok(occurrences) => occurrences,
                Err(ServiceError::RecurrenceParse { rule, reason }) => {
                    tracing::warn!(
                        root_id = %root.id,
                        rule = %rule,
                        reason = %reason,
                        "Skipping recurring root with unparseable stored rule"
                    );
                    continue;
                }
                Err(err) => return Err(err),
            };

            resolved.extend(
                merge(root, occurrences, exceptions)
                    .into_iter()
                    .filter(|occurrence| filters.matches(occurrence)),
            );
        }
    }

    sort_resolved(&mut resolved);
    Ok(resolved)
}

/// ## Summary
/// Answers a calendar window query against the store.
///
/// Fetches single events overlapping the window, recurring roots that could
/// intersect it, and the exception rows of those roots; resolves them with
/// [`resolve_window`]; and enriches the result with subject name/color.
///
/// ## Errors
/// Returns storage errors unchanged, or expansion errors per
/// [`resolve_window`].
#[tracing::instrument(skip(conn, filters), fields(start = %window.start(), end = %window.end()))]
pub async fn query_events(
    conn: &mut DbConnection<'_>,
    window: QueryWindow,
    filters: &EventFilters,
    limit: u16,
) -> ServiceResult<Vec<ResolvedOccurrence>> {
    let singles = event::single_events_in_window(conn, window.start(), window.end()).await?;

    let (roots, exceptions) = if filters.skip_recurring {
        (Vec::new(), Vec::new())
    } else {
        let roots = event::recurring_roots_for_window(conn, window.end()).await?;
        let root_ids: Vec<Uuid> = roots.iter().map(|root| root.id).collect();
        let exceptions = event::exceptions_for_roots(conn, &root_ids).await?;
        (roots, exceptions)
    };

    tracing::debug!(
        singles = singles.len(),
        roots = roots.len(),
        exceptions = exceptions.len(),
        "Resolving calendar window"
    );

    let mut resolved = resolve_window(&singles, &roots, &exceptions, window, filters, limit)?;
    attach_subjects(conn, &mut resolved).await?;

    Ok(resolved)
}

/// Fills in subject name/color for every occurrence referencing a subject.
async fn attach_subjects(
    conn: &mut DbConnection<'_>,
    resolved: &mut [ResolvedOccurrence],
) -> ServiceResult<()> {
    let mut ids: Vec<Uuid> = resolved
        .iter()
        .filter_map(|occurrence| occurrence.subject_id)
        .collect();
    ids.sort_unstable();
    ids.dedup();

    if ids.is_empty() {
        return Ok(());
    }

    let subjects: HashMap<Uuid, SubjectInfo> = subject::subjects_by_ids(conn, &ids)
        .await?
        .iter()
        .map(|row| (row.id, SubjectInfo::from(row)))
        .collect();

    for occurrence in resolved {
        if let Some(subject_id) = occurrence.subject_id {
            occurrence.subject = subjects.get(&subject_id).cloned();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::types::OccurrenceKind;
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};

    fn utc(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).single().expect("valid instant")
    }

    fn event_row(title: &str, start: DateTime<Utc>, rule: Option<&str>) -> CalendarEvent {
        CalendarEvent {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: None,
            event_type: "lesson".to_string(),
            color: None,
            start_at: start,
            end_at: Some(start + TimeDelta::hours(1)),
            timezone: None,
            all_day: false,
            recurrence_rule: rule.map(String::from),
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

    fn january() -> QueryWindow {
        QueryWindow::new(utc(2025, 1, 1, 0), utc(2025, 2, 1, 0)).expect("valid window")
    }

    #[test]
    fn unions_singles_with_expanded_series() {
        let single = event_row("Parents evening", utc(2025, 1, 15, 18), None);
        let root = event_row("Maths", utc(2025, 1, 6, 9), Some("FREQ=WEEKLY;COUNT=4"));

        let resolved = resolve_window(
            std::slice::from_ref(&single),
            std::slice::from_ref(&root),
            &[],
            january(),
            &EventFilters::default(),
            100,
        )
        .expect("resolution succeeds");

        assert_eq!(resolved.len(), 5);
        let starts: Vec<_> = resolved.iter().map(|o| o.start_at).collect();
        let mut sorted = starts.clone();
        sorted.sort();
        assert_eq!(starts, sorted, "result must be chronologically sorted");
        assert_eq!(
            resolved
                .iter()
                .filter(|o| o.kind == OccurrenceKind::Single)
                .count(),
            1
        );
    }

    #[test]
    fn skip_recurring_keeps_only_singles() {
        let single = event_row("Parents evening", utc(2025, 1, 15, 18), None);
        let root = event_row("Maths", utc(2025, 1, 6, 9), Some("FREQ=WEEKLY;COUNT=4"));
        let filters = EventFilters {
            skip_recurring: true,
            ..EventFilters::default()
        };

        let resolved = resolve_window(
            std::slice::from_ref(&single),
            std::slice::from_ref(&root),
            &[],
            january(),
            &filters,
            100,
        )
        .expect("resolution succeeds");

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].event_id, single.id);
    }

    #[test]
    fn event_type_filter_applies_to_generated_occurrences() {
        let mut exam_root = event_row("Mock exam", utc(2025, 1, 7, 9), Some("FREQ=WEEKLY;COUNT=2"));
        exam_root.event_type = "exam".to_string();
        let lesson_root = event_row("Maths", utc(2025, 1, 6, 9), Some("FREQ=WEEKLY;COUNT=4"));

        let filters = EventFilters {
            event_types: Some(vec!["exam".to_string()]),
            ..EventFilters::default()
        };

        let resolved = resolve_window(
            &[],
            &[lesson_root, exam_root],
            &[],
            january(),
            &filters,
            100,
        )
        .expect("resolution succeeds");

        assert_eq!(resolved.len(), 2);
        assert!(resolved.iter().all(|o| o.event_type == "exam"));
    }

    #[test]
    fn subject_filter_matches_on_subject_id() {
        let maths = Uuid::new_v4();
        let mut root = event_row("Maths", utc(2025, 1, 6, 9), Some("FREQ=WEEKLY;COUNT=4"));
        root.subject_id = Some(maths);
        let other = event_row("History", utc(2025, 1, 8, 9), None);

        let filters = EventFilters {
            subject_id: Some(maths),
            ..EventFilters::default()
        };

        let resolved = resolve_window(
            std::slice::from_ref(&other),
            std::slice::from_ref(&root),
            &[],
            january(),
            &filters,
            100,
        )
        .expect("resolution succeeds");

        assert_eq!(resolved.len(), 4);
        assert!(resolved.iter().all(|o| o.subject_id == Some(maths)));
    }

    #[test]
    fn unparseable_stored_rule_skips_that_series_only() {
        let broken = event_row("Broken", utc(2025, 1, 6, 9), Some("FREQ=NOPE"));
        let healthy = event_row("Maths", utc(2025, 1, 6, 9), Some("FREQ=WEEKLY;COUNT=4"));

        let resolved = resolve_window(
            &[],
            &[broken, healthy],
            &[],
            january(),
            &EventFilters::default(),
            100,
        )
        .expect("resolution succeeds");

        assert_eq!(resolved.len(), 4);
        assert!(resolved.iter().all(|o| o.title == "Maths"));
    }

    #[test]
    fn deletion_and_edit_scenario_end_to_end() {
        // Weekly Monday 09:00Z series, COUNT=4: 01-06, 01-13, 01-20, 01-27.
        let root = event_row("Maths", utc(2025, 1, 6, 9), Some("FREQ=WEEKLY;COUNT=4"));

        let mut deleted = event_row("Maths", utc(2025, 1, 13, 9), None);
        deleted.parent_id = Some(root.id);
        deleted.is_exception = true;
        deleted.exception_original_start = Some(utc(2025, 1, 13, 9));
        deleted.is_cancelled = true;

        let mut moved = event_row("Maths", utc(2025, 1, 20, 15), None);
        moved.parent_id = Some(root.id);
        moved.is_exception = true;
        moved.exception_original_start = Some(utc(2025, 1, 20, 9));

        let resolved = resolve_window(
            &[],
            std::slice::from_ref(&root),
            &[deleted, moved],
            january(),
            &EventFilters::default(),
            100,
        )
        .expect("resolution succeeds");

        let starts: Vec<_> = resolved.iter().map(|o| o.start_at).collect();
        assert_eq!(
            starts,
            vec![utc(2025, 1, 6, 9), utc(2025, 1, 20, 15), utc(2025, 1, 27, 9)]
        );
    }
}
